//! Product table boundary.
//!
//! This module defines the store capability the stock ledger runs against,
//! with an in-memory implementation (tests/dev) and a Postgres one.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryProductStore;
pub use postgres::PostgresProductStore;
pub use r#trait::{ProductStore, StockWrite, StoreError, VersionedProduct};
