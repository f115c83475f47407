use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use shopfront_core::{ExpectedVersion, ProductId};
use shopfront_inventory::Product;

/// A product row together with its optimistic-concurrency version.
///
/// Versions start at 1 when a row is inserted and grow by one per committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionedProduct {
    pub product: Product,
    pub version: u64,
}

/// A conditional stock write: applies only if the row is still at `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockWrite {
    pub product_id: ProductId,
    pub stock: u32,
    pub is_low_stock: bool,
    pub expected: ExpectedVersion,
}

impl StockWrite {
    /// Build a write that persists `snapshot`'s stock state.
    pub fn from_snapshot(snapshot: &Product, expected: ExpectedVersion) -> Self {
        Self {
            product_id: snapshot.id(),
            stock: snapshot.stock(),
            is_low_stock: snapshot.is_low_stock(),
            expected,
        }
    }
}

/// Product store operation error.
///
/// These are **infrastructure errors**; stock rules (not found, insufficient
/// stock) are decided in `shopfront-inventory`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("product {0} already exists")]
    Duplicate(ProductId),

    #[error("product {0} does not exist")]
    Missing(ProductId),

    #[error("invalid product data: {0}")]
    Invalid(String),

    #[error("product store unavailable: {0}")]
    Unavailable(String),
}

/// Read/update capability over product rows keyed by id.
///
/// ## Commit Semantics
///
/// `commit()` is an atomic multi-row conditional write:
/// - every write is checked against the row's current version
/// - if any check fails (`Conflict`) or any row is absent (`Missing`), nothing is written
/// - otherwise all rows are updated, each version advancing by one
///
/// Readers never observe a batch half-applied.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Insert a new product row at version 1 (seed/import).
    async fn insert(&self, product: Product) -> Result<VersionedProduct, StoreError>;

    /// Load the rows for `ids`, ordered by id. Unknown ids are omitted.
    async fn load(&self, ids: &[ProductId]) -> Result<Vec<VersionedProduct>, StoreError>;

    async fn get(&self, id: ProductId) -> Result<Option<VersionedProduct>, StoreError> {
        Ok(self.load(&[id]).await?.into_iter().next())
    }

    /// All rows, ordered by id.
    async fn list(&self) -> Result<Vec<VersionedProduct>, StoreError>;

    /// Apply all writes or none; results follow the order of `writes`.
    async fn commit(&self, writes: Vec<StockWrite>) -> Result<Vec<VersionedProduct>, StoreError>;
}

#[async_trait]
impl<S> ProductStore for Arc<S>
where
    S: ProductStore + ?Sized,
{
    async fn insert(&self, product: Product) -> Result<VersionedProduct, StoreError> {
        (**self).insert(product).await
    }

    async fn load(&self, ids: &[ProductId]) -> Result<Vec<VersionedProduct>, StoreError> {
        (**self).load(ids).await
    }

    async fn get(&self, id: ProductId) -> Result<Option<VersionedProduct>, StoreError> {
        (**self).get(id).await
    }

    async fn list(&self) -> Result<Vec<VersionedProduct>, StoreError> {
        (**self).list().await
    }

    async fn commit(&self, writes: Vec<StockWrite>) -> Result<Vec<VersionedProduct>, StoreError> {
        (**self).commit(writes).await
    }
}

/// Reject write batches that name the same product twice.
pub(crate) fn ensure_distinct_writes(writes: &[StockWrite]) -> Result<(), StoreError> {
    let mut seen = std::collections::HashSet::with_capacity(writes.len());
    for w in writes {
        if !seen.insert(w.product_id) {
            return Err(StoreError::Invalid(format!(
                "write batch names product {} more than once",
                w.product_id
            )));
        }
    }
    Ok(())
}
