//! `shopfront-core`: shared building blocks for the storefront.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{ProductId, UserId};
pub use version::ExpectedVersion;
