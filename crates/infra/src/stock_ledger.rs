//! Stock decrement transaction (application-level orchestration).
//!
//! The `StockLedger` runs a checkout batch against the product table:
//!
//! ```text
//! Batch of (product_id, quantity)
//!   ↓
//! 1. Validate batch shape (non-empty, positive quantities)
//!   ↓
//! 2. Load referenced rows with their versions
//!   ↓
//! 3. Plan decrements (pure; all-or-nothing)
//!   ↓
//! 4. Commit every changed row in one conditional write (version CAS)
//!   ↓
//! 5. On version conflict: re-read and re-plan (bounded)
//! ```
//!
//! A batch either commits in full or leaves every row untouched. Two batches
//! racing for the same product cannot both succeed on the same stock: the
//! loser's commit misses its version check, re-reads the winner's result, and
//! is planned again against it.
//!
//! This module contains no IO itself; it composes the `ProductStore` trait.

use std::collections::HashMap;

use thiserror::Error;
use tracing::instrument;

use shopfront_core::{ExpectedVersion, ProductId};
use shopfront_inventory::{
    DecrementRequest, LowStockStatus, Product, StockError, plan_decrements, validate_batch,
};

use crate::product_store::{ProductStore, StockWrite, StoreError, VersionedProduct};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Extra attempts after a version conflict before giving up.
    pub max_conflict_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 8,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed batch (empty, zero quantity).
    #[error("invalid decrement batch: {0}")]
    InvalidBatch(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("insufficient stock for product {product_id} (requested {requested}, available {available})")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("product {0} already exists")]
    DuplicateProduct(ProductId),

    /// Transport/transaction failure, or conflicts that outlasted the retry budget.
    #[error("product store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store refused the data itself (constraint, undecodable row); retrying cannot help.
    #[error("product store rejected the operation: {0}")]
    StoreRejected(String),
}

impl LedgerError {
    /// Worth retrying the whole call later (nothing was written).
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_))
    }
}

impl From<StockError> for LedgerError {
    fn from(value: StockError) -> Self {
        match value {
            StockError::EmptyBatch | StockError::InvalidQuantity(_) => {
                LedgerError::InvalidBatch(value.to_string())
            }
            StockError::ProductNotFound(id) => LedgerError::ProductNotFound(id),
            StockError::InsufficientStock {
                product_id,
                requested,
                available,
            } => LedgerError::InsufficientStock {
                product_id,
                requested,
                available,
            },
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Missing(id) => LedgerError::ProductNotFound(id),
            StoreError::Duplicate(id) => LedgerError::DuplicateProduct(id),
            StoreError::Conflict(msg) => LedgerError::StoreUnavailable(format!("unresolved conflict: {msg}")),
            StoreError::Invalid(msg) => LedgerError::StoreRejected(msg),
            StoreError::Unavailable(msg) => LedgerError::StoreUnavailable(msg),
        }
    }
}

/// Inventory-consistent stock adjustment over an injected product store.
#[derive(Debug)]
pub struct StockLedger<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> StockLedger<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }
}

impl<S> StockLedger<S>
where
    S: ProductStore,
{
    /// Atomically decrement stock for every request in the batch.
    ///
    /// Returns the updated snapshots in request order. On any failure no row
    /// is modified.
    #[instrument(skip(self, requests), fields(lines = requests.len()), err)]
    pub async fn apply_decrements(
        &self,
        requests: &[DecrementRequest],
    ) -> Result<Vec<Product>, LedgerError> {
        validate_batch(requests)?;

        let mut ids: Vec<ProductId> = requests.iter().map(|r| r.product_id).collect();
        ids.sort();
        ids.dedup();

        let attempts = self.config.max_conflict_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let rows: HashMap<ProductId, VersionedProduct> = self
                .store
                .load(&ids)
                .await?
                .into_iter()
                .map(|row| (row.product.id(), row))
                .collect();

            let plan = plan_decrements(requests, |id| rows.get(&id).map(|r| r.product.clone()))?;

            let writes = plan
                .updates
                .iter()
                .map(|p| {
                    let row = rows.get(&p.id()).ok_or(LedgerError::ProductNotFound(p.id()))?;
                    Ok(StockWrite::from_snapshot(p, ExpectedVersion::Exact(row.version)))
                })
                .collect::<Result<Vec<_>, LedgerError>>()?;

            match self.store.commit(writes).await {
                Ok(_) => {
                    tracing::info!(attempt, products = plan.updates.len(), "decrement batch committed");
                    return Ok(plan.snapshots);
                }
                Err(StoreError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "decrement batch lost a version race; re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::StoreUnavailable(format!(
            "optimistic concurrency retries exhausted after {attempts} attempts"
        )))
    }

    /// Read a product's low-stock state (no mutation).
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn check_low_stock(&self, product_id: ProductId) -> Result<LowStockStatus, LedgerError> {
        let row = self
            .store
            .get(product_id)
            .await?
            .ok_or(LedgerError::ProductNotFound(product_id))?;
        Ok(row.product.low_stock())
    }

    /// Seed/import a new product.
    #[instrument(skip(self, product), fields(product_id = %product.id()), err)]
    pub async fn register_product(&self, product: Product) -> Result<Product, LedgerError> {
        let row = self.store.insert(product).await?;
        Ok(row.product)
    }

    /// Administrative overwrite of a product's stock level.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn set_stock(&self, product_id: ProductId, stock: u32) -> Result<Product, LedgerError> {
        let attempts = self.config.max_conflict_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let row = self
                .store
                .get(product_id)
                .await?
                .ok_or(LedgerError::ProductNotFound(product_id))?;

            let next = row.product.with_stock(stock);
            let write = StockWrite::from_snapshot(&next, ExpectedVersion::Exact(row.version));

            match self.store.commit(vec![write]).await {
                Ok(_) => return Ok(next),
                Err(StoreError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "stock overwrite lost a version race; re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::StoreUnavailable(format!(
            "optimistic concurrency retries exhausted after {attempts} attempts"
        )))
    }

    /// Every product currently at or below its threshold.
    pub async fn low_stock_report(&self) -> Result<Vec<Product>, LedgerError> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .map(|row| row.product)
            .filter(Product::is_low_stock)
            .collect())
    }

    pub async fn products(&self) -> Result<Vec<Product>, LedgerError> {
        Ok(self.store.list().await?.into_iter().map(|row| row.product).collect())
    }
}
