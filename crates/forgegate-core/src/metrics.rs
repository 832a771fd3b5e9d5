//! Global atomic counters for forgegate observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a pipeline run).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    reviews_dispatched: AtomicU64,
    reviewer_failures: AtomicU64,
    findings_merged: AtomicU64,
    gate_evaluations: AtomicU64,
    gate_failures: AtomicU64,
    correction_iterations: AtomicU64,
    rollbacks: AtomicU64,
    overrides_granted: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub reviews_dispatched: u64,
    pub reviewer_failures: u64,
    pub findings_merged: u64,
    pub gate_evaluations: u64,
    pub gate_failures: u64,
    pub correction_iterations: u64,
    pub rollbacks: u64,
    pub overrides_granted: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            reviews_dispatched: AtomicU64::new(0),
            reviewer_failures: AtomicU64::new(0),
            findings_merged: AtomicU64::new(0),
            gate_evaluations: AtomicU64::new(0),
            gate_failures: AtomicU64::new(0),
            correction_iterations: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            overrides_granted: AtomicU64::new(0),
        }
    }

    /// One reviewer invocation was dispatched.
    pub fn inc_reviews_dispatched(&self) {
        self.reviews_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reviews_dispatched", "counter incremented");
    }

    /// One reviewer errored and was substituted with an empty result.
    pub fn inc_reviewer_failures(&self) {
        self.reviewer_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reviewer_failures", "counter incremented");
    }

    /// `n` duplicate findings were merged away by the aggregator.
    pub fn add_findings_merged(&self, n: u64) {
        self.findings_merged.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "findings_merged", n, "counter incremented");
    }

    pub fn inc_gate_evaluations(&self) {
        self.gate_evaluations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_evaluations", "counter incremented");
    }

    pub fn inc_gate_failures(&self) {
        self.gate_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "gate_failures", "counter incremented");
    }

    pub fn inc_correction_iterations(&self) {
        self.correction_iterations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "correction_iterations", "counter incremented");
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks", "counter incremented");
    }

    pub fn inc_overrides_granted(&self) {
        self.overrides_granted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "overrides_granted", "counter incremented");
    }

    /// Read every counter at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reviews_dispatched: self.reviews_dispatched.load(Ordering::Relaxed),
            reviewer_failures: self.reviewer_failures.load(Ordering::Relaxed),
            findings_merged: self.findings_merged.load(Ordering::Relaxed),
            gate_evaluations: self.gate_evaluations.load(Ordering::Relaxed),
            gate_failures: self.gate_failures.load(Ordering::Relaxed),
            correction_iterations: self.correction_iterations.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            overrides_granted: self.overrides_granted.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a pipeline run, end of a
    /// correction loop) rather than on every increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            reviews_dispatched = s.reviews_dispatched,
            reviewer_failures = s.reviewer_failures,
            findings_merged = s.findings_merged,
            gate_evaluations = s.gate_evaluations,
            gate_failures = s.gate_failures,
            correction_iterations = s.correction_iterations,
            rollbacks = s.rollbacks,
            overrides_granted = s.overrides_granted,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.reviews_dispatched.store(0, Ordering::Relaxed);
        self.reviewer_failures.store(0, Ordering::Relaxed);
        self.findings_merged.store(0, Ordering::Relaxed);
        self.gate_evaluations.store(0, Ordering::Relaxed);
        self.gate_failures.store(0, Ordering::Relaxed);
        self.correction_iterations.store(0, Ordering::Relaxed);
        self.rollbacks.store(0, Ordering::Relaxed);
        self.overrides_granted.store(0, Ordering::Relaxed);
    }
}
