use crate::pipeline::Classification;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing extraction activity.
#[derive(Default)]
pub struct PipelineMetrics {
    runs: AtomicU64,
    full_success: AtomicU64,
    partial_success: AtomicU64,
    failures: AtomicU64,
    missing_sessions: AtomicU64,
    items_succeeded: AtomicU64,
    items_failed: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished pipeline run and its per-item tally.
    pub fn record_run(&self, classification: Classification, succeeded: u64, failed: u64) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let bucket = match classification {
            Classification::FullSuccess => &self.full_success,
            Classification::PartialSuccess => &self.partial_success,
            Classification::Failure => &self.failures,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
        self.items_succeeded.fetch_add(succeeded, Ordering::Relaxed);
        self.items_failed.fetch_add(failed, Ordering::Relaxed);
    }

    /// Record a run against a session that no longer exists.
    pub fn record_missing_session(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.missing_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            full_success: self.full_success.load(Ordering::Relaxed),
            partial_success: self.partial_success.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            missing_sessions: self.missing_sessions.load(Ordering::Relaxed),
            items_succeeded: self.items_succeeded.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of extraction counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Pipeline runs since startup, including runs against missing sessions.
    pub runs: u64,
    /// Runs classified as full success.
    pub full_success: u64,
    /// Runs classified as partial success.
    pub partial_success: u64,
    /// Runs classified as failure.
    pub failures: u64,
    /// Failed runs caused by an unknown or expired session.
    pub missing_sessions: u64,
    /// Items that produced text.
    pub items_succeeded: u64,
    /// Items that produced no text or an error.
    pub items_failed: u64,
}
