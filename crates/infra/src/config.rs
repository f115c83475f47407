//! Process configuration loaded from environment variables.

use std::time::Duration;

use anyhow::{Context, bail};

use crate::checkout::CheckoutConfig;
use crate::stock_ledger::LedgerConfig;

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub ledger: LedgerConfig,
    pub checkout: CheckoutConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let ttl_minutes: i64 = parse_or(get("TOKEN_TTL_MINUTES"), "TOKEN_TTL_MINUTES", 60)?;
        if ttl_minutes <= 0 {
            bail!("TOKEN_TTL_MINUTES must be positive, got {ttl_minutes}");
        }
        let token_ttl = chrono::Duration::try_minutes(ttl_minutes)
            .with_context(|| format!("TOKEN_TTL_MINUTES out of range: {ttl_minutes}"))?;

        let defaults = CheckoutConfig::default();
        let backoff_ms: u64 = parse_or(
            get("CHECKOUT_RETRY_BACKOFF_MS"),
            "CHECKOUT_RETRY_BACKOFF_MS",
            defaults.retry_backoff.as_millis() as u64,
        )?;

        Ok(Self {
            database_url: get("DATABASE_URL"),
            jwt_secret,
            token_ttl,
            ledger: LedgerConfig {
                max_conflict_retries: parse_or(
                    get("LEDGER_MAX_CONFLICT_RETRIES"),
                    "LEDGER_MAX_CONFLICT_RETRIES",
                    LedgerConfig::default().max_conflict_retries,
                )?,
            },
            checkout: CheckoutConfig {
                max_store_retries: parse_or(
                    get("CHECKOUT_MAX_STORE_RETRIES"),
                    "CHECKOUT_MAX_STORE_RETRIES",
                    defaults.max_store_retries,
                )?,
                retry_backoff: Duration::from_millis(backoff_ms),
            },
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {v:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.token_ttl, chrono::Duration::minutes(60));
        assert_eq!(cfg.ledger, LedgerConfig::default());
        assert_eq!(cfg.checkout, CheckoutConfig::default());
    }

    #[test]
    fn values_are_read_from_lookup() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_MINUTES", "15"),
            ("LEDGER_MAX_CONFLICT_RETRIES", "2"),
            ("CHECKOUT_MAX_STORE_RETRIES", " 0 "),
            ("CHECKOUT_RETRY_BACKOFF_MS", "250"),
        ])
        .unwrap();

        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.token_ttl, chrono::Duration::minutes(15));
        assert_eq!(cfg.ledger.max_conflict_retries, 2);
        assert_eq!(cfg.checkout.max_store_retries, 0);
        assert_eq!(cfg.checkout.retry_backoff, Duration::from_millis(250));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let cfg = config(&[("DATABASE_URL", ""), ("JWT_SECRET", "  ")]).unwrap();
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = config(&[("LEDGER_MAX_CONFLICT_RETRIES", "many")]).unwrap_err();
        assert!(err.to_string().contains("LEDGER_MAX_CONFLICT_RETRIES"));

        assert!(config(&[("CHECKOUT_MAX_STORE_RETRIES", "-1")]).is_err());
        assert!(config(&[("TOKEN_TTL_MINUTES", "0")]).is_err());

        let huge = i64::MAX.to_string();
        let err = config(&[("TOKEN_TTL_MINUTES", huge.as_str())]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
