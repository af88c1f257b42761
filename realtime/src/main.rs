use anyhow::{Context, Result};
use realtime::{run_command_loop, NotifierHub, NotifierServer};
use signal_storage::{PgSignalStore, SignalService};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, Level};

/// Usage: notifier [config.toml]
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("🚀 Starting Signal Notifier");

    let config_path = std::env::args().nth(1);
    let config = common::load_config(config_path.as_deref())?;

    let store = PgSignalStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to database")?;
    info!("✅ Connected to database");

    let hub = Arc::new(NotifierHub::new(config.notifier.channel_capacity));
    let service = Arc::new(SignalService::new(Arc::new(store), hub.clone()));

    let (inbound_tx, inbound_rx) = mpsc::channel(config.notifier.channel_capacity.max(1));
    let server = NotifierServer::new(hub, inbound_tx, config.notifier.heartbeat_interval());

    let listener = TcpListener::bind(&config.notifier.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.notifier.bind_addr))?;

    tokio::select! {
        result = server.serve(listener) => {
            result?
        }
        _ = run_command_loop(service, inbound_rx) => {
            info!("Command loop finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("👋 Shutting down gracefully...");
        }
    }

    Ok(())
}
