//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_blocks_total` - Total number of sealed blocks (genesis included)
//! - `ledger_seal_attempts_total` - Digests computed while searching nonces
//! - `ledger_seal_duration_seconds` - Histogram of proof-of-work latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Total blocks sealed
    pub blocks_total: IntCounter,

    /// Total nonce attempts
    pub seal_attempts: IntCounter,

    /// Seal duration histogram
    pub seal_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let blocks_total = IntCounter::new("ledger_blocks_total", "Total number of sealed blocks")?;
        registry.register(Box::new(blocks_total.clone()))?;

        let seal_attempts = IntCounter::new(
            "ledger_seal_attempts_total",
            "Digests computed while searching for a nonce",
        )?;
        registry.register(Box::new(seal_attempts.clone()))?;

        let seal_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_seal_duration_seconds",
                "Histogram of proof-of-work latencies",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0]),
        )?;
        registry.register(Box::new(seal_duration.clone()))?;

        Ok(Self {
            blocks_total,
            seal_attempts,
            seal_duration,
            registry,
        })
    }

    /// Record a sealed block
    pub fn record_block_sealed(&self, attempts: u64, duration_seconds: f64) {
        self.blocks_total.inc();
        self.seal_attempts.inc_by(attempts);
        self.seal_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
