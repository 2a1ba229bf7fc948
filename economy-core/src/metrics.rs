//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the economy.
//!
//! # Metrics
//!
//! - `economy_accounts_created_total` / `economy_accounts_deleted_total`
//! - `economy_purchases_total` - Successful slice purchases
//! - `economy_consumptions_total` - Successful slice consumptions
//! - `economy_rejections_total{operation,reason}` - Refused transitions
//! - `economy_transaction_conflicts_total` - Optimistic retries
//! - `economy_rebuilds_total` / `economy_rebuild_failures_total`
//! - `economy_rebuild_duration_seconds` - Histogram of rebuild latencies
//! - `economy_leaderboard_entries` - Entries written by the last rebuild

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Accounts created
    pub accounts_created: IntCounter,

    /// Accounts deleted
    pub accounts_deleted: IntCounter,

    /// Successful purchases
    pub purchases_total: IntCounter,

    /// Successful consumptions
    pub consumptions_total: IntCounter,

    /// Refused transitions by operation and reason
    pub rejections: IntCounterVec,

    /// Version conflicts retried by the ledger
    pub transaction_conflicts: IntCounter,

    /// Completed rebuilds
    pub rebuilds_total: IntCounter,

    /// Failed rebuilds
    pub rebuild_failures: IntCounter,

    /// Rebuild duration histogram
    pub rebuild_duration: Histogram,

    /// Entries written by the last successful rebuild
    pub leaderboard_entries: IntGauge,

    registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let accounts_created = IntCounter::new(
            "economy_accounts_created_total",
            "Total number of accounts created",
        )?;
        registry.register(Box::new(accounts_created.clone()))?;

        let accounts_deleted = IntCounter::new(
            "economy_accounts_deleted_total",
            "Total number of accounts deleted",
        )?;
        registry.register(Box::new(accounts_deleted.clone()))?;

        let purchases_total =
            IntCounter::new("economy_purchases_total", "Total number of slices purchased")?;
        registry.register(Box::new(purchases_total.clone()))?;

        let consumptions_total =
            IntCounter::new("economy_consumptions_total", "Total number of slices eaten")?;
        registry.register(Box::new(consumptions_total.clone()))?;

        let rejections = IntCounterVec::new(
            Opts::new("economy_rejections_total", "Refused ledger transitions"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(rejections.clone()))?;

        let transaction_conflicts = IntCounter::new(
            "economy_transaction_conflicts_total",
            "Optimistic transaction retries caused by concurrent writers",
        )?;
        registry.register(Box::new(transaction_conflicts.clone()))?;

        let rebuilds_total =
            IntCounter::new("economy_rebuilds_total", "Total number of leaderboard rebuilds")?;
        registry.register(Box::new(rebuilds_total.clone()))?;

        let rebuild_failures = IntCounter::new(
            "economy_rebuild_failures_total",
            "Total number of failed leaderboard rebuilds",
        )?;
        registry.register(Box::new(rebuild_failures.clone()))?;

        let rebuild_duration = Histogram::with_opts(
            HistogramOpts::new(
                "economy_rebuild_duration_seconds",
                "Histogram of leaderboard rebuild latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(rebuild_duration.clone()))?;

        let leaderboard_entries = IntGauge::new(
            "economy_leaderboard_entries",
            "Entries written by the last successful rebuild",
        )?;
        registry.register(Box::new(leaderboard_entries.clone()))?;

        Ok(Self {
            accounts_created,
            accounts_deleted,
            purchases_total,
            consumptions_total,
            rejections,
            transaction_conflicts,
            rebuilds_total,
            rebuild_failures,
            rebuild_duration,
            leaderboard_entries,
            registry,
        })
    }

    /// Record a refused transition
    pub fn record_rejection(&self, operation: &str, error: &crate::Error) {
        self.rejections
            .with_label_values(&[operation, error.reason()])
            .inc();
    }

    /// Record a finished rebuild
    pub fn record_rebuild(&self, entries: usize, duration_seconds: f64) {
        self.rebuilds_total.inc();
        self.rebuild_duration.observe(duration_seconds);
        self.leaderboard_entries.set(entries as i64);
    }

    /// Record a failed rebuild
    pub fn record_rebuild_failure(&self) {
        self.rebuild_failures.inc();
    }

    /// Text exposition of every collector
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.purchases_total.get(), 0);
        assert_eq!(metrics.rebuilds_total.get(), 0);

        // Private registries: a second collector must not clash
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_rejection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejection("purchase", &crate::Error::NotFound("a".into()));
        metrics.record_rejection("purchase", &crate::Error::NotFound("b".into()));
        assert_eq!(
            metrics
                .rejections
                .with_label_values(&["purchase", "not_found"])
                .get(),
            2
        );
    }

    #[test]
    fn test_record_rebuild() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rebuild(7, 0.002);
        assert_eq!(metrics.rebuilds_total.get(), 1);
        assert_eq!(metrics.leaderboard_entries.get(), 7);

        let text = metrics.render().unwrap();
        assert!(text.contains("economy_rebuilds_total 1"));
    }
}
