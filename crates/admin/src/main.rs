use std::sync::Arc;

use anyhow::{Context, bail};

use shopfront_admin::{Admin, AdminCommand, USAGE};
use shopfront_core::UserId;
use shopfront_infra::{AppConfig, InMemoryProductStore, PostgresProductStore, ProductStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopfront_observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("-h" | "--help" | "help")) {
        println!("{USAGE}");
        return Ok(());
    }
    let command = AdminCommand::parse(&args).map_err(|e| anyhow::anyhow!("{e}\n\n{USAGE}"))?;

    let config = AppConfig::from_env()?;

    let store: Arc<dyn ProductStore> = match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            let store = PostgresProductStore::new(pool);
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None if command.needs_store() => {
            bail!("DATABASE_URL is required for this command\n\n{USAGE}");
        }
        None => Arc::new(InMemoryProductStore::new()),
    };

    let operator = UserId::new();
    tracing::info!(operator = %operator, ?command, "running admin command");

    let output = Admin::new(store, &config, operator).run(command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
