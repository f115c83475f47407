use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use shopfront_core::ProductId;
use shopfront_inventory::Product;

use super::r#trait::{ProductStore, StockWrite, StoreError, VersionedProduct, ensure_distinct_writes};

/// In-memory product table.
///
/// Intended for tests/dev. A commit validates every write and then applies
/// them all under a single write lock.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    rows: RwLock<HashMap<ProductId, VersionedProduct>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `products`, each at version 1.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let rows = products
            .into_iter()
            .map(|product| (product.id(), VersionedProduct { product, version: 1 }))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn insert(&self, product: Product) -> Result<VersionedProduct, StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        if rows.contains_key(&product.id()) {
            return Err(StoreError::Duplicate(product.id()));
        }
        let row = VersionedProduct { product, version: 1 };
        rows.insert(row.product.id(), row.clone());
        Ok(row)
    }

    async fn load(&self, ids: &[ProductId]) -> Result<Vec<VersionedProduct>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;

        let mut wanted = ids.to_vec();
        wanted.sort();
        wanted.dedup();

        Ok(wanted
            .into_iter()
            .filter_map(|id| rows.get(&id).cloned())
            .collect())
    }

    async fn list(&self) -> Result<Vec<VersionedProduct>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let mut all: Vec<VersionedProduct> = rows.values().cloned().collect();
        all.sort_by_key(|r| r.product.id());
        Ok(all)
    }

    async fn commit(&self, writes: Vec<StockWrite>) -> Result<Vec<VersionedProduct>, StoreError> {
        ensure_distinct_writes(&writes)?;

        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        // 1) Check every write before touching anything.
        for w in &writes {
            let row = rows.get(&w.product_id).ok_or(StoreError::Missing(w.product_id))?;
            w.expected
                .check(row.version)
                .map_err(|e| StoreError::Conflict(format!("product {}: {e}", w.product_id)))?;
        }

        // 2) Apply.
        let mut committed = Vec::with_capacity(writes.len());
        for w in writes {
            let row = rows.get_mut(&w.product_id).ok_or(StoreError::Missing(w.product_id))?;
            row.product = row.product.with_stock(w.stock);
            row.version += 1;
            committed.push(row.clone());
        }

        Ok(committed)
    }
}
