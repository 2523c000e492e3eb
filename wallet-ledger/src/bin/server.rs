//! Wallet ledger service binary

use anyhow::Context;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wallet_ledger::{Config, Ledger, ReconciliationScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match std::env::var("WALLET_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("Failed to load config from environment")?,
    };

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting wallet ledger"
    );

    let reconciliation = config.reconciliation.clone();

    // Open ledger
    let ledger = Ledger::open(config).await.context("Failed to open ledger")?;
    tracing::info!("Ledger opened successfully");

    let scheduler = if reconciliation.enabled {
        Some(ReconciliationScheduler::spawn(
            ledger.clone(),
            Duration::from_secs(reconciliation.interval_secs),
        ))
    } else {
        tracing::info!("Background reconciliation disabled");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down wallet ledger");

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await?;
    }

    Ok(())
}
