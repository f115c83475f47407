//! Inventory domain module.
//!
//! This crate contains the stock rules of the storefront, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod decrement;
pub mod product;

pub use decrement::{DecrementRequest, StockError, StockPlan, plan_decrements, validate_batch};
pub use product::{LowStockStatus, NewProduct, Product, is_low_stock};
