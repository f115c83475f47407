//! Postgres-backed product store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | Seeding a product id twice |
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transaction won |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Overlapping batches locked rows in opposite order |
//! | Database (check constraint violation) | `23514` | `Invalid` | Negative stock or inconsistent low-stock flag |
//! | Database (other) | Any other | `Unavailable` | Other database errors |
//! | Decode / ColumnNotFound | N/A | `Invalid` | Schema drift |
//! | PoolClosed / PoolTimedOut / Io / Tls / other | N/A | `Unavailable` | Transport failures |
//!
//! ## Thread Safety
//!
//! `PostgresProductStore` is `Send + Sync` and can be shared across tasks.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::{Span, instrument};

use shopfront_core::ProductId;
use shopfront_inventory::Product;

use super::r#trait::{ProductStore, StockWrite, StoreError, VersionedProduct, ensure_distinct_writes};

/// Schema for the `products` table (idempotent).
pub const SCHEMA: &str = include_str!("../../migrations/0001_products.sql");

/// Postgres-backed product table.
///
/// ## Optimistic Concurrency
///
/// `commit()` runs one transaction of conditional updates:
///
/// ```text
/// UPDATE products SET stock = .., version = version + 1
///  WHERE id = $1 AND version = $expected
/// ```
///
/// A concurrent writer that committed first makes the `WHERE` clause miss, so
/// the update touches zero rows; the whole transaction is then rolled back and
/// `Conflict` is reported. Rows are updated in id order to keep lock
/// acquisition consistent across overlapping batches.
#[derive(Debug, Clone)]
pub struct PostgresProductStore {
    pool: Arc<PgPool>,
}

impl PostgresProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `products` table and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    #[instrument(skip(self, product), fields(product_id = %product.id()), err)]
    async fn insert(&self, product: Product) -> Result<VersionedProduct, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (
                id,
                name,
                stock,
                low_stock_threshold,
                is_low_stock,
                version
            )
            VALUES ($1, $2, $3, $4, $5, 1)
            RETURNING id, name, stock, low_stock_threshold, is_low_stock, version
            "#,
        )
        .bind(product.id().get())
        .bind(product.name())
        .bind(i64::from(product.stock()))
        .bind(i64::from(product.low_stock_threshold()))
        .bind(product.is_low_stock())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(product.id())
            } else {
                map_sqlx_error("insert_product", e)
            }
        })?;

        decode_row(&row)
    }

    #[instrument(
        skip(self, ids),
        fields(requested = ids.len(), found = tracing::field::Empty),
        err
    )]
    async fn load(&self, ids: &[ProductId]) -> Result<Vec<VersionedProduct>, StoreError> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();

        let rows = sqlx::query(
            r#"
            SELECT id, name, stock, low_stock_threshold, is_low_stock, version
            FROM products
            WHERE id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(raw)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_products", e))?;

        Span::current().record("found", rows.len());
        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<VersionedProduct>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, stock, low_stock_threshold, is_low_stock, version
            FROM products
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip(self, writes), fields(writes = writes.len()), err)]
    async fn commit(&self, writes: Vec<StockWrite>) -> Result<Vec<VersionedProduct>, StoreError> {
        if writes.is_empty() {
            return Ok(vec![]);
        }
        ensure_distinct_writes(&writes)?;

        let mut order: Vec<usize> = (0..writes.len()).collect();
        order.sort_by_key(|&i| writes[i].product_id);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut committed: Vec<Option<VersionedProduct>> = vec![None; writes.len()];

        for idx in order {
            let w = &writes[idx];
            let expected = w
                .expected
                .exact()
                .map(|v| {
                    i64::try_from(v).map_err(|_| StoreError::Invalid(format!("version {v} out of range")))
                })
                .transpose()?;

            let updated = sqlx::query(
                r#"
                UPDATE products
                SET stock = $2,
                    is_low_stock = $3,
                    version = version + 1,
                    updated_at = NOW()
                WHERE id = $1
                  AND ($4::BIGINT IS NULL OR version = $4)
                RETURNING id, name, stock, low_stock_threshold, is_low_stock, version
                "#,
            )
            .bind(w.product_id.get())
            .bind(i64::from(w.stock))
            .bind(w.is_low_stock)
            .bind(expected)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_stock", e))?;

            match updated {
                Some(row) => committed[idx] = Some(decode_row(&row)?),
                None => {
                    let current: Option<i64> =
                        sqlx::query_scalar("SELECT version FROM products WHERE id = $1")
                            .bind(w.product_id.get())
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(|e| map_sqlx_error("read_version", e))?;

                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;

                    return Err(match current {
                        Some(found) => StoreError::Conflict(format!(
                            "product {}: expected {:?}, found {found}",
                            w.product_id, w.expected
                        )),
                        None => StoreError::Missing(w.product_id),
                    });
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        committed
            .into_iter()
            .map(|row| row.ok_or_else(|| StoreError::Invalid("write left without result".to_string())))
            .collect()
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some("23514") => StoreError::Invalid(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::RowNotFound => {
            StoreError::Invalid(format!("unexpected row not found in {operation}"))
        }
        sqlx::Error::ColumnNotFound(col) => {
            StoreError::Invalid(format!("column '{col}' missing in {operation}"))
        }
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Invalid(format!("failed to decode column {index} in {operation}: {source}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: i64,
    name: String,
    stock: i64,
    low_stock_threshold: i64,
    is_low_stock: bool,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            stock: row.try_get("stock")?,
            low_stock_threshold: row.try_get("low_stock_threshold")?,
            is_low_stock: row.try_get("is_low_stock")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<ProductRow> for VersionedProduct {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let out_of_range =
            |field: &str, value: i64| StoreError::Invalid(format!("{field} {value} out of range for product {}", row.id));

        let stock = u32::try_from(row.stock).map_err(|_| out_of_range("stock", row.stock))?;
        let threshold = u32::try_from(row.low_stock_threshold)
            .map_err(|_| out_of_range("low_stock_threshold", row.low_stock_threshold))?;
        let version = u64::try_from(row.version).map_err(|_| out_of_range("version", row.version))?;

        let product = Product::new(ProductId::new(row.id), row.name, stock, threshold)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        if product.is_low_stock() != row.is_low_stock {
            return Err(StoreError::Invalid(format!(
                "stored low-stock flag disagrees with stock for product {}",
                row.id
            )));
        }

        Ok(VersionedProduct { product, version })
    }
}

fn decode_row(row: &PgRow) -> Result<VersionedProduct, StoreError> {
    ProductRow::from_row(row)
        .map_err(|e| StoreError::Invalid(format!("failed to deserialize product row: {e}")))?
        .try_into()
}
