//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `wallet_operations_total{operation,outcome}` - Operations by result
//! - `wallet_conflict_retries_total` - Units retried after a lock/commit race
//! - `wallet_replayed_references_total` - Calls answered with an existing entry
//! - `wallet_reconciliation_mismatches` - Accounts drifting in the last run
//! - `wallet_reconciliation_duration_seconds` - Histogram of run latencies

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Operations by name and outcome label
    pub operations_total: IntCounterVec,

    /// Conflict retries
    pub conflict_retries: IntCounter,

    /// Replayed references
    pub replayed_references: IntCounter,

    /// Mismatches found by the last reconciliation
    pub reconciliation_mismatches: IntGauge,

    /// Reconciliation duration histogram
    pub reconciliation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("conflict_retries", &self.conflict_retries.get())
            .field("replayed_references", &self.replayed_references.get())
            .field("reconciliation_mismatches", &self.reconciliation_mismatches.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("wallet_operations_total", "Ledger operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let conflict_retries = IntCounter::new(
            "wallet_conflict_retries_total",
            "Units of work retried after a lock or commit conflict",
        )?;
        registry.register(Box::new(conflict_retries.clone()))?;

        let replayed_references = IntCounter::new(
            "wallet_replayed_references_total",
            "Calls answered with the entry already holding their reference",
        )?;
        registry.register(Box::new(replayed_references.clone()))?;

        let reconciliation_mismatches = IntGauge::new(
            "wallet_reconciliation_mismatches",
            "Accounts whose stored balance drifted from the log in the last run",
        )?;
        registry.register(Box::new(reconciliation_mismatches.clone()))?;

        let reconciliation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_reconciliation_duration_seconds",
                "Histogram of reconciliation run latencies",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        )?;
        registry.register(Box::new(reconciliation_duration.clone()))?;

        Ok(Self {
            operations_total,
            conflict_retries,
            replayed_references,
            reconciliation_mismatches,
            reconciliation_duration,
            registry,
        })
    }

    /// Record an operation result
    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Record a conflict retry
    pub fn record_conflict_retry(&self) {
        self.conflict_retries.inc();
    }

    /// Record a replayed reference
    pub fn record_replay(&self) {
        self.replayed_references.inc();
    }

    /// Record a finished reconciliation run
    pub fn record_reconciliation(&self, mismatches: usize, duration_seconds: f64) {
        self.reconciliation_mismatches.set(mismatches as i64);
        self.reconciliation_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
