//! Checkout flow: reserve a cart's stock for an authenticated user.
//!
//! `Checkout` is the caller of the stock ledger. It decides what to do with
//! each ledger outcome:
//!
//! - success → a receipt listing the updated products and the ones now low on stock
//! - `ProductNotFound` / `InsufficientStock` / `InvalidBatch` → surfaced to the user as-is
//! - `StoreUnavailable` → retried with a fixed backoff, then surfaced as `Unavailable`
//! - `StoreRejected` → surfaced as `Unavailable` without retrying

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use shopfront_core::{ProductId, UserId};
use shopfront_inventory::{DecrementRequest, Product};

use crate::product_store::ProductStore;
use crate::stock_ledger::{LedgerError, StockLedger};

/// Retry settings for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Retries after the first attempt (0 = no retries).
    pub max_store_retries: u32,
    /// Fixed delay between attempts.
    pub retry_backoff: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            max_store_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

impl CheckoutConfig {
    pub fn no_retry() -> Self {
        Self {
            max_store_retries: 0,
            ..Default::default()
        }
    }

    /// `retries_so_far` counts retries already performed.
    pub fn should_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_store_retries
    }
}

/// Proof of a committed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub reference: Uuid,
    pub user_id: UserId,
    pub placed_at: DateTime<Utc>,
    /// Updated snapshots, one per order line.
    pub items: Vec<Product>,
    /// Distinct products at or below their threshold after this order.
    pub low_stock: Vec<ProductId>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("insufficient stock for product {product_id} (requested {requested}, available {available})")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("inventory unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },
}

impl CheckoutError {
    /// Message suitable for showing to the shopper.
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::InvalidOrder(_) => {
                "Your cart is empty or contains an invalid quantity.".to_string()
            }
            CheckoutError::ProductNotFound(id) => {
                format!("Product {id} is no longer available.")
            }
            CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            } => format!(
                "Not enough stock for product {product_id}: you asked for {requested}, only {available} left."
            ),
            CheckoutError::Unavailable { .. } => {
                "We could not reserve your items right now. Please try again.".to_string()
            }
        }
    }
}

impl CheckoutError {
    fn from_ledger(err: LedgerError, attempts: u32) -> Self {
        match err {
            LedgerError::InvalidBatch(msg) => CheckoutError::InvalidOrder(msg),
            LedgerError::ProductNotFound(id) => CheckoutError::ProductNotFound(id),
            LedgerError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            LedgerError::DuplicateProduct(id) => CheckoutError::Unavailable {
                attempts,
                reason: format!("unexpected duplicate product {id}"),
            },
            LedgerError::StoreUnavailable(reason) | LedgerError::StoreRejected(reason) => {
                CheckoutError::Unavailable { attempts, reason }
            }
        }
    }
}

/// Checkout service over a shared ledger.
#[derive(Debug)]
pub struct Checkout<S> {
    ledger: Arc<StockLedger<S>>,
    config: CheckoutConfig,
}

impl<S> Clone for Checkout<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            config: self.config,
        }
    }
}

impl<S> Checkout<S>
where
    S: ProductStore,
{
    pub fn new(ledger: Arc<StockLedger<S>>, config: CheckoutConfig) -> Self {
        Self { ledger, config }
    }

    pub fn ledger(&self) -> &StockLedger<S> {
        &self.ledger
    }

    /// Reserve stock for every line in the cart, all-or-nothing.
    #[instrument(skip(self, lines), fields(user_id = %user_id, lines = lines.len()), err)]
    pub async fn reserve(
        &self,
        user_id: UserId,
        lines: &[DecrementRequest],
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let mut retries = 0u32;
        let items = loop {
            match self.ledger.apply_decrements(lines).await {
                Ok(items) => break items,
                Err(e) if e.is_transient() && self.config.should_retry(retries) => {
                    retries += 1;
                    tracing::warn!(
                        retry = retries,
                        max_retries = self.config.max_store_retries,
                        error = %e,
                        "stock reservation failed transiently; retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(CheckoutError::from_ledger(e, retries + 1)),
            }
        };

        let mut low_stock: Vec<ProductId> = Vec::new();
        for p in items.iter().filter(|p| p.is_low_stock()) {
            if !low_stock.contains(&p.id()) {
                low_stock.push(p.id());
            }
        }
        for id in &low_stock {
            tracing::warn!(product_id = %id, "product at or below low-stock threshold");
        }

        Ok(CheckoutReceipt {
            reference: Uuid::now_v7(),
            user_id,
            placed_at: Utc::now(),
            items,
            low_stock,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::product_store::{InMemoryProductStore, StockWrite, StoreError, VersionedProduct};

    fn product(id: i64, stock: u32, threshold: u32) -> Product {
        Product::new(ProductId::new(id), format!("Product {id}"), stock, threshold).unwrap()
    }

    fn req(id: i64, quantity: u32) -> DecrementRequest {
        DecrementRequest::new(ProductId::new(id), quantity)
    }

    fn fast_retries(max_store_retries: u32) -> CheckoutConfig {
        CheckoutConfig {
            max_store_retries,
            retry_backoff: Duration::from_millis(1),
        }
    }

    /// Store whose commits fail with `failure` a fixed number of times.
    struct FlakyStore {
        inner: InMemoryProductStore,
        failure: StoreError,
        failures_left: AtomicU32,
        commits_seen: AtomicU32,
    }

    impl FlakyStore {
        fn new(products: impl IntoIterator<Item = Product>, failures: u32) -> Self {
            Self {
                inner: InMemoryProductStore::with_products(products),
                failure: StoreError::Unavailable("connection reset".to_string()),
                failures_left: AtomicU32::new(failures),
                commits_seen: AtomicU32::new(0),
            }
        }

        fn rejecting(products: impl IntoIterator<Item = Product>) -> Self {
            Self {
                failure: StoreError::Invalid("check constraint products_low_stock_flag".to_string()),
                ..Self::new(products, u32::MAX)
            }
        }
    }

    #[async_trait]
    impl ProductStore for FlakyStore {
        async fn insert(&self, product: Product) -> Result<VersionedProduct, StoreError> {
            self.inner.insert(product).await
        }

        async fn load(&self, ids: &[ProductId]) -> Result<Vec<VersionedProduct>, StoreError> {
            self.inner.load(ids).await
        }

        async fn list(&self) -> Result<Vec<VersionedProduct>, StoreError> {
            self.inner.list().await
        }

        async fn commit(&self, writes: Vec<StockWrite>) -> Result<Vec<VersionedProduct>, StoreError> {
            self.commits_seen.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(self.failure.clone());
            }
            self.inner.commit(writes).await
        }
    }

    fn checkout(store: FlakyStore, config: CheckoutConfig) -> Checkout<FlakyStore> {
        Checkout::new(Arc::new(StockLedger::new(store)), config)
    }

    #[tokio::test]
    async fn receipt_lists_items_and_low_stock_products() {
        let store = FlakyStore::new([product(1, 10, 5), product(2, 50, 5)], 0);
        let checkout = checkout(store, CheckoutConfig::default());
        let user = UserId::new();

        let receipt = checkout
            .reserve(user, &[req(1, 3), req(2, 1), req(1, 3)])
            .await
            .unwrap();

        assert_eq!(receipt.user_id, user);
        assert_eq!(receipt.items.len(), 3);
        assert_eq!(receipt.items[2].stock(), 4);
        assert_eq!(receipt.low_stock, vec![ProductId::new(1)]);
        assert_eq!(receipt.reference.get_version_num(), 7);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = FlakyStore::new([product(1, 10, 5)], 2);
        let checkout = checkout(store, fast_retries(3));

        let receipt = checkout.reserve(UserId::new(), &[req(1, 1)]).await.unwrap();
        assert_eq!(receipt.items[0].stock(), 9);
        assert_eq!(checkout.ledger().store().commits_seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = FlakyStore::new([product(1, 10, 5)], 10);
        let checkout = checkout(store, fast_retries(2));

        let err = checkout.reserve(UserId::new(), &[req(1, 1)]).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Unavailable { attempts: 3, .. }));
        assert_eq!(checkout.ledger().store().commits_seen.load(Ordering::SeqCst), 3);

        let status = checkout.ledger().check_low_stock(ProductId::new(1)).await.unwrap();
        assert_eq!(status.current_stock, 10);
    }

    #[tokio::test]
    async fn rejected_writes_are_not_retried() {
        let store = FlakyStore::rejecting([product(1, 10, 5)]);
        let checkout = checkout(store, fast_retries(5));

        let err = checkout.reserve(UserId::new(), &[req(1, 1)]).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Unavailable { attempts: 1, .. }));
        assert_eq!(checkout.ledger().store().commits_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn business_failures_are_not_retried() {
        let store = FlakyStore::new([product(1, 4, 5)], 0);
        let checkout = checkout(store, fast_retries(5));

        let err = checkout.reserve(UserId::new(), &[req(1, 10)]).await.unwrap_err();
        assert_eq!(
            err,
            CheckoutError::InsufficientStock {
                product_id: ProductId::new(1),
                requested: 10,
                available: 4,
            }
        );
        assert_eq!(
            err.user_message(),
            "Not enough stock for product 1: you asked for 10, only 4 left."
        );
        // Planning failed before any commit was attempted.
        assert_eq!(checkout.ledger().store().commits_seen.load(Ordering::SeqCst), 0);

        let err = checkout.reserve(UserId::new(), &[req(7, 1)]).await.unwrap_err();
        assert_eq!(err, CheckoutError::ProductNotFound(ProductId::new(7)));
    }

    #[tokio::test]
    async fn empty_cart_is_an_invalid_order() {
        let store = FlakyStore::new([product(1, 4, 5)], 0);
        let checkout = checkout(store, CheckoutConfig::no_retry());

        let err = checkout.reserve(UserId::new(), &[]).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidOrder(_)));
    }
}
