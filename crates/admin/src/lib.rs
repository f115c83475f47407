//! `shopfront-admin`: operator commands over the product table.
//!
//! Every command prints a single JSON document on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;

use shopfront_auth::Hs256JwtValidator;
use shopfront_core::{ProductId, UserId};
use shopfront_infra::{AppConfig, Checkout, ProductStore, StockLedger};
use shopfront_inventory::{DecrementRequest, NewProduct, Product};

pub const USAGE: &str = "\
usage: shopfront-admin <command>

commands:
  seed <file.json>           import an array of {id, name, stock, low_stock_threshold}
  list                       all products
  low-stock <id>             low-stock status of one product
  low-stock-report           products at or below their threshold
  decrement <id>=<qty>...    reserve stock as one all-or-nothing batch
  set-stock <id> <stock>     overwrite a product's stock
  issue-token <user-uuid>    mint a bearer token

All commands except issue-token read or change the product table and
require DATABASE_URL.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Seed(PathBuf),
    List,
    LowStock(ProductId),
    LowStockReport,
    Decrement(Vec<DecrementRequest>),
    SetStock { product_id: ProductId, stock: u32 },
    IssueToken(UserId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("missing command")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command}: expected {expected}")]
    WrongArity { command: &'static str, expected: &'static str },

    #[error("invalid argument {arg:?}: {reason}")]
    InvalidArgument { arg: String, reason: String },
}

fn invalid(arg: &str, reason: impl ToString) -> UsageError {
    UsageError::InvalidArgument {
        arg: arg.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_line(arg: &str) -> Result<DecrementRequest, UsageError> {
    let (id, qty) = arg
        .split_once('=')
        .ok_or_else(|| invalid(arg, "expected <id>=<qty>"))?;
    let product_id: ProductId = id.parse().map_err(|e| invalid(arg, e))?;
    let quantity: u32 = qty.trim().parse().map_err(|e| invalid(arg, e))?;
    Ok(DecrementRequest::new(product_id, quantity))
}

impl AdminCommand {
    /// Whether the command reads or changes the product table.
    pub fn needs_store(&self) -> bool {
        !matches!(self, AdminCommand::IssueToken(_))
    }

    /// Parse the arguments following the program name.
    pub fn parse<I, A>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let (command, rest) = args.split_first().ok_or(UsageError::MissingCommand)?;

        match (command.as_str(), rest) {
            ("seed", [path]) => Ok(AdminCommand::Seed(PathBuf::from(path))),
            ("seed", _) => Err(UsageError::WrongArity {
                command: "seed",
                expected: "<file.json>",
            }),
            ("list", []) => Ok(AdminCommand::List),
            ("list", _) => Err(UsageError::WrongArity {
                command: "list",
                expected: "no arguments",
            }),
            ("low-stock", [id]) => Ok(AdminCommand::LowStock(id.parse().map_err(|e| invalid(id, e))?)),
            ("low-stock", _) => Err(UsageError::WrongArity {
                command: "low-stock",
                expected: "<id>",
            }),
            ("low-stock-report", []) => Ok(AdminCommand::LowStockReport),
            ("low-stock-report", _) => Err(UsageError::WrongArity {
                command: "low-stock-report",
                expected: "no arguments",
            }),
            ("decrement", []) => Err(UsageError::WrongArity {
                command: "decrement",
                expected: "<id>=<qty>...",
            }),
            ("decrement", lines) => Ok(AdminCommand::Decrement(
                lines.iter().map(|l| parse_line(l)).collect::<Result<_, _>>()?,
            )),
            ("set-stock", [id, stock]) => Ok(AdminCommand::SetStock {
                product_id: id.parse().map_err(|e| invalid(id, e))?,
                stock: stock.trim().parse().map_err(|e| invalid(stock, e))?,
            }),
            ("set-stock", _) => Err(UsageError::WrongArity {
                command: "set-stock",
                expected: "<id> <stock>",
            }),
            ("issue-token", [user]) => Ok(AdminCommand::IssueToken(user.parse().map_err(|e| invalid(user, e))?)),
            ("issue-token", _) => Err(UsageError::WrongArity {
                command: "issue-token",
                expected: "<user-uuid>",
            }),
            (other, _) => Err(UsageError::UnknownCommand(other.to_string())),
        }
    }
}

/// Runs admin commands against an injected product store.
pub struct Admin {
    checkout: Checkout<Arc<dyn ProductStore>>,
    tokens: Hs256JwtValidator,
    token_ttl: chrono::Duration,
    operator: UserId,
}

impl Admin {
    pub fn new(store: Arc<dyn ProductStore>, config: &AppConfig, operator: UserId) -> Self {
        let ledger = Arc::new(StockLedger::with_config(store, config.ledger));
        Self {
            checkout: Checkout::new(ledger, config.checkout),
            tokens: Hs256JwtValidator::new(config.jwt_secret.clone().into_bytes()),
            token_ttl: config.token_ttl,
            operator,
        }
    }

    pub async fn run(&self, command: AdminCommand) -> anyhow::Result<Value> {
        let ledger = self.checkout.ledger();
        match command {
            AdminCommand::Seed(path) => {
                let raw = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read seed file {}", path.display()))?;
                self.seed_json(&raw).await
            }
            AdminCommand::List => Ok(serde_json::to_value(ledger.products().await?)?),
            AdminCommand::LowStock(id) => Ok(serde_json::to_value(ledger.check_low_stock(id).await?)?),
            AdminCommand::LowStockReport => Ok(serde_json::to_value(ledger.low_stock_report().await?)?),
            AdminCommand::Decrement(lines) => {
                let receipt = self
                    .checkout
                    .reserve(self.operator, &lines)
                    .await
                    .map_err(|e| anyhow::anyhow!("{} ({e})", e.user_message()))?;
                Ok(serde_json::to_value(receipt)?)
            }
            AdminCommand::SetStock { product_id, stock } => {
                Ok(serde_json::to_value(ledger.set_stock(product_id, stock).await?)?)
            }
            AdminCommand::IssueToken(user_id) => {
                let issued = self.tokens.issue(user_id, Utc::now(), self.token_ttl)?;
                Ok(json!({
                    "token": issued.token,
                    "user_id": user_id,
                    "expires_at": issued.expires_at,
                }))
            }
        }
    }

    /// Import a JSON array of products.
    ///
    /// Every record is validated, and its id checked against the file and the
    /// store, before any is inserted.
    pub async fn seed_json(&self, raw: &str) -> anyhow::Result<Value> {
        let records: Vec<NewProduct> = serde_json::from_str(raw).context("seed file is not a product array")?;
        let products = records
            .into_iter()
            .map(|record| {
                let id = record.id;
                Product::try_from(record).with_context(|| format!("invalid seed record for product {id}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut ids: Vec<ProductId> = Vec::with_capacity(products.len());
        for product in &products {
            if ids.contains(&product.id()) {
                bail!("seed file lists product {} more than once", product.id());
            }
            ids.push(product.id());
        }

        let ledger = self.checkout.ledger();
        let existing = ledger.store().load(&ids).await?;
        if !existing.is_empty() {
            let taken: Vec<String> = existing.iter().map(|row| row.product.id().to_string()).collect();
            bail!("products already exist: {}", taken.join(", "));
        }

        let mut inserted = Vec::with_capacity(products.len());
        for product in products {
            inserted.push(ledger.register_product(product).await?);
        }
        tracing::info!(count = inserted.len(), "seeded products");
        Ok(json!({ "inserted": inserted }))
    }
}

#[cfg(test)]
mod tests {
    use shopfront_auth::JwtValidator;
    use shopfront_infra::InMemoryProductStore;

    use super::*;

    fn test_config() -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some("admin-test-secret".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn admin() -> Admin {
        Admin::new(Arc::new(InMemoryProductStore::new()), &test_config(), UserId::new())
    }

    const SEED: &str = r#"[
        { "id": 1, "name": "Widget", "stock": 10, "low_stock_threshold": 5 },
        { "id": 2, "name": "Gadget", "stock": 2, "low_stock_threshold": 3 }
    ]"#;

    #[test]
    fn parses_commands() {
        assert_eq!(AdminCommand::parse(["list"]), Ok(AdminCommand::List));
        assert_eq!(
            AdminCommand::parse(["low-stock", "7"]),
            Ok(AdminCommand::LowStock(ProductId::new(7)))
        );
        assert_eq!(
            AdminCommand::parse(["decrement", "1=3", "2=1"]),
            Ok(AdminCommand::Decrement(vec![
                DecrementRequest::new(ProductId::new(1), 3),
                DecrementRequest::new(ProductId::new(2), 1),
            ]))
        );
        assert_eq!(
            AdminCommand::parse(["set-stock", "4", "12"]),
            Ok(AdminCommand::SetStock {
                product_id: ProductId::new(4),
                stock: 12,
            })
        );
    }

    #[test]
    fn only_token_issuing_runs_without_a_store() {
        assert!(!AdminCommand::IssueToken(UserId::new()).needs_store());
        assert!(AdminCommand::List.needs_store());
        assert!(AdminCommand::Seed(PathBuf::from("catalog.json")).needs_store());
        assert!(AdminCommand::parse(["decrement", "1=1"]).unwrap().needs_store());
    }

    #[test]
    fn rejects_bad_invocations() {
        let none: [&str; 0] = [];
        assert_eq!(AdminCommand::parse(none), Err(UsageError::MissingCommand));
        assert_eq!(
            AdminCommand::parse(["restock"]),
            Err(UsageError::UnknownCommand("restock".to_string()))
        );
        assert!(matches!(
            AdminCommand::parse(["decrement"]),
            Err(UsageError::WrongArity { .. })
        ));
        assert!(matches!(
            AdminCommand::parse(["decrement", "1:3"]),
            Err(UsageError::InvalidArgument { .. })
        ));
        assert!(matches!(
            AdminCommand::parse(["set-stock", "1", "-4"]),
            Err(UsageError::InvalidArgument { .. })
        ));
        assert!(matches!(
            AdminCommand::parse(["issue-token", "not-a-uuid"]),
            Err(UsageError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn seed_then_report() {
        let admin = admin();
        let out = admin.seed_json(SEED).await.unwrap();
        assert_eq!(out["inserted"].as_array().unwrap().len(), 2);

        let report = admin.run(AdminCommand::LowStockReport).await.unwrap();
        assert_eq!(report[0]["id"], 2);
        assert_eq!(report[0]["is_low_stock"], true);

        let status = admin.run(AdminCommand::LowStock(ProductId::new(1))).await.unwrap();
        assert_eq!(
            status,
            json!({ "is_low_stock": false, "current_stock": 10, "threshold": 5 })
        );
    }

    #[tokio::test]
    async fn invalid_seed_inserts_nothing() {
        let admin = admin();
        let bad = r#"[
            { "id": 1, "name": "Widget", "stock": 10, "low_stock_threshold": 5 },
            { "id": 2, "name": "   ", "stock": 2, "low_stock_threshold": 3 }
        ]"#;
        assert!(admin.seed_json(bad).await.is_err());

        let all = admin.run(AdminCommand::List).await.unwrap();
        assert_eq!(all, json!([]));
    }

    #[tokio::test]
    async fn repeated_seed_id_inserts_nothing() {
        let admin = admin();
        let repeated = r#"[
            { "id": 1, "name": "A", "stock": 5, "low_stock_threshold": 1 },
            { "id": 1, "name": "B", "stock": 7, "low_stock_threshold": 1 }
        ]"#;
        let err = admin.seed_json(repeated).await.unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let all = admin.run(AdminCommand::List).await.unwrap();
        assert_eq!(all, json!([]));
    }

    #[tokio::test]
    async fn seed_overlapping_store_inserts_nothing() {
        let admin = admin();
        admin.seed_json(SEED).await.unwrap();

        let overlapping = r#"[
            { "id": 3, "name": "Gizmo", "stock": 9, "low_stock_threshold": 2 },
            { "id": 2, "name": "Gadget v2", "stock": 1, "low_stock_threshold": 3 }
        ]"#;
        let err = admin.seed_json(overlapping).await.unwrap_err();
        assert!(err.to_string().contains("already exist: 2"));

        let ids: Vec<i64> = admin
            .run(AdminCommand::List)
            .await
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn issue_token_with_out_of_range_ttl_is_an_error() {
        let config = AppConfig::from_lookup(|key| match key {
            "TOKEN_TTL_MINUTES" => Some("1000000000000".to_string()),
            _ => None,
        })
        .unwrap();
        let admin = Admin::new(Arc::new(InMemoryProductStore::new()), &config, UserId::new());

        let err = admin.run(AdminCommand::IssueToken(UserId::new())).await.unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn decrement_runs_as_one_batch() {
        let admin = admin();
        admin.seed_json(SEED).await.unwrap();

        let receipt = admin
            .run(AdminCommand::parse(["decrement", "1=6"]).unwrap())
            .await
            .unwrap();
        assert_eq!(receipt["items"][0]["stock"], 4);
        assert_eq!(receipt["low_stock"], json!([1]));

        let err = admin
            .run(AdminCommand::parse(["decrement", "1=1", "2=5"]).unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("only 2 left"));

        let status = admin.run(AdminCommand::LowStock(ProductId::new(1))).await.unwrap();
        assert_eq!(status["current_stock"], 4);
    }

    #[tokio::test]
    async fn set_stock_and_issue_token() {
        let admin = admin();
        admin.seed_json(SEED).await.unwrap();

        let updated = admin
            .run(AdminCommand::SetStock {
                product_id: ProductId::new(2),
                stock: 30,
            })
            .await
            .unwrap();
        assert_eq!(updated["is_low_stock"], false);

        let user = UserId::new();
        let out = admin.run(AdminCommand::IssueToken(user)).await.unwrap();
        let token = out["token"].as_str().unwrap();

        let validator = Hs256JwtValidator::new(b"admin-test-secret".to_vec());
        let claims = validator.validate(token, Utc::now()).unwrap();
        assert_eq!(claims.sub, user);
    }
}
