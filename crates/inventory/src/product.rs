use serde::{Deserialize, Serialize};

use shopfront_core::{DomainError, DomainResult, ProductId};

/// A product is low on stock once its remaining units fall to or below the threshold.
pub fn is_low_stock(stock: u32, threshold: u32) -> bool {
    stock <= threshold
}

/// Snapshot of a catalog product's stock state.
///
/// `is_low_stock` is derived and never set directly: every constructor and
/// mutation recomputes it from the current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    id: ProductId,
    name: String,
    stock: u32,
    low_stock_threshold: u32,
    is_low_stock: bool,
}

impl Product {
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        stock: u32,
        low_stock_threshold: u32,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            stock,
            low_stock_threshold,
            is_low_stock: is_low_stock(stock, low_stock_threshold),
        })
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    pub fn low_stock_threshold(&self) -> u32 {
        self.low_stock_threshold
    }

    pub fn is_low_stock(&self) -> bool {
        self.is_low_stock
    }

    /// Snapshot with a new stock level; the low-stock flag follows the new level.
    pub fn with_stock(&self, stock: u32) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            stock,
            low_stock_threshold: self.low_stock_threshold,
            is_low_stock: is_low_stock(stock, self.low_stock_threshold),
        }
    }

    pub fn low_stock(&self) -> LowStockStatus {
        LowStockStatus {
            is_low_stock: self.is_low_stock,
            current_stock: self.stock,
            threshold: self.low_stock_threshold,
        }
    }
}

/// Result of a low-stock check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockStatus {
    pub is_low_stock: bool,
    pub current_stock: u32,
    pub threshold: u32,
}

/// Seed/import record for a product that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: ProductId,
    pub name: String,
    pub stock: u32,
    pub low_stock_threshold: u32,
}

impl TryFrom<NewProduct> for Product {
    type Error = DomainError;

    fn try_from(value: NewProduct) -> Result<Self, Self::Error> {
        Product::new(value.id, value.name, value.stock, value.low_stock_threshold)
    }
}
