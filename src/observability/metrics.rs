//! Engine metrics
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe, lock-free

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one engine
///
/// All counters use Relaxed ordering; readers see eventually exact values.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Statements that reached the session
    statements_executed: AtomicU64,
    /// Statements the session rejected or failed
    statements_failed: AtomicU64,
    /// Prepared statement cache hits
    prepared_hits: AtomicU64,
    /// Selects built with an unindexed filter
    unindexed_filters: AtomicU64,
    /// Batch chunks applied
    batches_applied: AtomicU64,
    /// Batch chunks failed
    batches_failed: AtomicU64,
    /// DDL statements applied by the synchronizer
    ddl_applied: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_statements_executed(&self) {
        self.statements_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_statements_failed(&self) {
        self.statements_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_prepared_hits(&self) {
        self.prepared_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unindexed_filters(&self) {
        self.unindexed_filters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_applied(&self) {
        self.batches_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ddl_applied(&self) {
        self.ddl_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            statements_executed: self.statements_executed.load(Ordering::Relaxed),
            statements_failed: self.statements_failed.load(Ordering::Relaxed),
            prepared_hits: self.prepared_hits.load(Ordering::Relaxed),
            unindexed_filters: self.unindexed_filters.load(Ordering::Relaxed),
            batches_applied: self.batches_applied.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            ddl_applied: self.ddl_applied.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub statements_executed: u64,
    pub statements_failed: u64,
    pub prepared_hits: u64,
    pub unindexed_filters: u64,
    pub batches_applied: u64,
    pub batches_failed: u64,
    pub ddl_applied: u64,
}

impl MetricsSnapshot {
    /// Snapshot rendered as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
