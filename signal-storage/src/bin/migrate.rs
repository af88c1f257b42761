use anyhow::{Context, Result};
use signal_storage::{run_migrations, PgSignalStore};
use std::path::Path;
use tracing::{error, info, Level};
use tracing_subscriber::fmt;

/// Usage: migrate [config.toml]
#[tokio::main]
async fn main() {
    fmt().with_max_level(Level::INFO).init();

    if let Err(e) = run().await {
        error!("❌ Migration run aborted: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let config = common::load_config(config_path.as_deref())?;

    let store = PgSignalStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;

    let report = run_migrations(store.pool(), Path::new(&config.migrations.dir)).await?;

    info!(
        "🏁 Migrations finished: {} applied, {} already present",
        report.applied.len(),
        report.skipped.len()
    );
    store.pool().close().await;
    Ok(())
}
