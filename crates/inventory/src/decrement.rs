use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shopfront_core::ProductId;

use crate::product::Product;

/// One line of a checkout batch: remove `quantity` units of a product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecrementRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl DecrementRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("decrement batch is empty")]
    EmptyBatch,

    #[error("quantity for product {0} must be positive")]
    InvalidQuantity(ProductId),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("insufficient stock for product {product_id} (requested {requested}, available {available})")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },
}

/// Outcome of planning a batch against a consistent view of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPlan {
    /// One snapshot per request, in request order (state right after that request).
    pub snapshots: Vec<Product>,
    /// Final state of every distinct product touched, in first-seen order.
    pub updates: Vec<Product>,
}

/// Reject malformed batches before touching any product.
pub fn validate_batch(requests: &[DecrementRequest]) -> Result<(), StockError> {
    if requests.is_empty() {
        return Err(StockError::EmptyBatch);
    }
    if let Some(bad) = requests.iter().find(|r| r.quantity == 0) {
        return Err(StockError::InvalidQuantity(bad.product_id));
    }
    Ok(())
}

/// Decide the outcome of a decrement batch (pure, all-or-nothing).
///
/// `lookup` is consulted at most once per distinct product. Requests naming the
/// same product draw from the stock left by earlier requests in the batch.
/// Any failing request fails the whole plan.
pub fn plan_decrements<F>(requests: &[DecrementRequest], mut lookup: F) -> Result<StockPlan, StockError>
where
    F: FnMut(ProductId) -> Option<Product>,
{
    validate_batch(requests)?;

    let mut working: HashMap<ProductId, Product> = HashMap::new();
    let mut order: Vec<ProductId> = Vec::new();
    let mut snapshots = Vec::with_capacity(requests.len());

    for request in requests {
        if !working.contains_key(&request.product_id) {
            let found = lookup(request.product_id)
                .ok_or(StockError::ProductNotFound(request.product_id))?;
            order.push(request.product_id);
            working.insert(request.product_id, found);
        }
        let current = &working[&request.product_id];

        let remaining = current
            .stock()
            .checked_sub(request.quantity)
            .ok_or(StockError::InsufficientStock {
                product_id: request.product_id,
                requested: request.quantity,
                available: current.stock(),
            })?;

        let next = current.with_stock(remaining);
        snapshots.push(next.clone());
        working.insert(request.product_id, next);
    }

    let updates = order
        .into_iter()
        .filter_map(|id| working.remove(&id))
        .collect();

    Ok(StockPlan { snapshots, updates })
}
