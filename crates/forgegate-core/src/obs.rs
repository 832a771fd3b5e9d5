//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `PipelineSpan` RAII guard
//! - Emission functions for key lifecycle events: phase start, review
//!   aggregation, gate evaluation, correction attempts, escalations,
//!   overrides and pipeline completion
//!
//! Events are emitted at `info!` level unless noted. For JSON output, call
//! [`crate::telemetry::init_tracing`] with `json = true`.

use tracing::{info, warn};

use crate::domain::{SeverityCounts, Verdict};

/// RAII guard that enters a run-scoped tracing span for the duration of a
/// pipeline run.
///
/// # Example
///
/// ```ignore
/// let _span = PipelineSpan::enter("run-12345", "task-7");
/// // All tracing calls are now associated with run_id and task_id.
/// ```
pub struct PipelineSpan {
    _span: tracing::span::EnteredSpan,
}

impl PipelineSpan {
    /// Create and enter a span tagged with the run and task IDs.
    pub fn enter(run_id: &str, task_id: &str) -> Self {
        Self {
            _span: pipeline_span(run_id, task_id).entered(),
        }
    }
}

/// Run-scoped span for instrumenting async work with
/// [`tracing::Instrument`].
pub fn pipeline_span(run_id: &str, task_id: &str) -> tracing::Span {
    tracing::info_span!("forgegate.pipeline", run_id = %run_id, task_id = %task_id)
}

/// Emit event: a phase started.
pub fn emit_phase_started(run_id: &str, phase: &str) {
    info!(event = "phase.started", run_id = %run_id, phase = %phase);
}

/// Emit event: specialist results were aggregated into a report.
pub fn emit_review_aggregated(phase: &str, findings: usize, suggestions: usize, failed: usize) {
    info!(
        event = "review.aggregated",
        phase = %phase,
        findings = findings,
        suggestions = suggestions,
        failed_reviewers = failed,
    );
}

/// Emit event: a quality gate produced a verdict.
pub fn emit_gate_evaluated(gate: &str, verdict: Verdict, counts: &SeverityCounts) {
    info!(
        event = "gate.evaluated",
        gate = %gate,
        verdict = %verdict,
        critical = counts.critical,
        high = counts.high,
        medium = counts.medium,
        low = counts.low,
    );
}

/// Emit event: one correction attempt finished.
pub fn emit_correction_attempt(task_id: &str, iteration: u32, success: bool, overall: Option<f64>) {
    info!(
        event = "correction.attempt",
        task_id = %task_id,
        iteration = iteration,
        success = success,
        confidence = overall.unwrap_or(-1.0),
    );
}

/// Emit event: the correction loop asked for a human decision (warning level).
pub fn emit_escalation(task_id: &str, gate: &str, reason: &str) {
    warn!(event = "correction.escalated", task_id = %task_id, gate = %gate, reason = %reason);
}

/// Emit event: a human override was recorded.
pub fn emit_override_recorded(gate: &str, reviewer: &str, approved: bool) {
    info!(
        event = "gate.override",
        gate = %gate,
        reviewer = %reviewer,
        approved = approved,
    );
}

/// Emit event: pipeline finished with duration and status.
pub fn emit_pipeline_finished(run_id: &str, duration_ms: u64, phases: usize, success: bool) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        phases = phases,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_span_create() {
        let _span = PipelineSpan::enter("test-run-id", "task-1");
        emit_phase_started("test-run-id", "plan");
        emit_gate_evaluated("plan_gate", Verdict::Pass, &SeverityCounts::default());
    }
}
