//! Economy server binary
//!
//! Owns the startup lifecycle: logging, configuration, store, initial
//! leaderboard rebuild. The request layer attaches to the opened ledger.

use anyhow::Context;
use economy_core::{Config, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration: explicit file first, then environment
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("loading configuration from environment")?,
    };

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        backend = ?config.store.backend,
        "Starting economy server"
    );

    // Open ledger
    let ledger = Ledger::open(config).await.context("opening ledger")?;

    // Leaderboard may be stale from a previous run
    let report = ledger.rebuild().await.context("initial leaderboard rebuild")?;
    tracing::info!(ranked = report.ranked, pruned = report.pruned, "Ledger ready");

    tokio::signal::ctrl_c().await?;

    match ledger.metrics().render() {
        Ok(text) => tracing::debug!(metrics = %text, "Final metrics"),
        Err(e) => tracing::warn!(error = %e, "Failed to render metrics"),
    }
    tracing::info!(
        service = %ledger.config().service_name,
        purchases = ledger.metrics().purchases_total.get(),
        consumptions = ledger.metrics().consumptions_total.get(),
        "Shutting down economy server"
    );
    Ok(())
}
