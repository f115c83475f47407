//! Infrastructure layer: product storage, the stock ledger, checkout, config.

pub mod checkout;
pub mod config;
pub mod product_store;
pub mod stock_ledger;


pub use checkout::{Checkout, CheckoutConfig, CheckoutError, CheckoutReceipt};
pub use config::AppConfig;
pub use product_store::{
    InMemoryProductStore, PostgresProductStore, ProductStore, StockWrite, StoreError, VersionedProduct,
};
pub use stock_ledger::{LedgerConfig, LedgerError, StockLedger};
