//! Severity-count quality gates.
//!
//! A [`QualityGate`] turns an [`AggregatedReport`]'s severity counts into a
//! [`Verdict`]. Gates come in two flavors that differ only in how High
//! findings are treated:
//!
//! - [`GateFlavor::PipelineWide`]: any High finding fails the gate.
//! - [`GateFlavor::ReviewOnly`]: High findings below `high_fail_threshold`
//!   ask for revision instead of failing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{AggregatedReport, SeverityCounts};
use crate::metrics::METRICS;

pub use crate::domain::Verdict;

/// High-count threshold used by review-only gates unless configured.
pub const DEFAULT_REVIEW_HIGH_FAIL_THRESHOLD: u32 = 5;

/// How a gate treats High findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateFlavor {
    /// Any High finding fails the gate.
    PipelineWide,
    /// Fewer than `high_fail_threshold` High findings → `NeedsRevision`.
    ReviewOnly { high_fail_threshold: u32 },
}

impl Default for GateFlavor {
    fn default() -> Self {
        Self::PipelineWide
    }
}

/// A named quality gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGate {
    pub name: String,
    pub flavor: GateFlavor,
}

impl QualityGate {
    pub fn new(name: impl Into<String>, flavor: GateFlavor) -> Self {
        Self {
            name: name.into(),
            flavor,
        }
    }

    /// Gate where any High finding fails.
    pub fn pipeline_wide(name: impl Into<String>) -> Self {
        Self::new(name, GateFlavor::PipelineWide)
    }

    /// Gate that tolerates up to `high_fail_threshold - 1` High findings as
    /// `NeedsRevision`.
    pub fn review_only(name: impl Into<String>, high_fail_threshold: u32) -> Self {
        Self::new(name, GateFlavor::ReviewOnly { high_fail_threshold })
    }

    /// Pure function of the severity counts.
    pub fn evaluate(&self, counts: &SeverityCounts) -> Verdict {
        let verdict = if counts.critical > 0 {
            Verdict::Fail
        } else if counts.high > 0 {
            match self.flavor {
                GateFlavor::PipelineWide => Verdict::Fail,
                GateFlavor::ReviewOnly {
                    high_fail_threshold,
                } if counts.high >= high_fail_threshold => Verdict::Fail,
                GateFlavor::ReviewOnly { .. } => Verdict::NeedsRevision,
            }
        } else if counts.medium > 0 {
            Verdict::NeedsImprovement
        } else {
            Verdict::Pass
        };

        METRICS.inc_gate_evaluations();
        if !verdict.is_pass() {
            METRICS.inc_gate_failures();
        }
        debug!(gate = %self.name, verdict = %verdict, "gate evaluated");
        verdict
    }

    /// Evaluate a report's severity counts.
    pub fn evaluate_report(&self, report: &AggregatedReport) -> Verdict {
        self.evaluate(&report.severity_counts)
    }

    /// A human override is needed for anything but a pass.
    pub fn requires_override(&self, verdict: Verdict) -> bool {
        !verdict.is_pass()
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::pipeline_wide("quality_gate")
    }
}

/// Human-readable reason a verdict blocks progression, if it does.
pub fn gate_block_reason(verdict: Verdict, counts: &SeverityCounts) -> Option<String> {
    match verdict {
        Verdict::Pass => None,
        Verdict::Fail if counts.critical > 0 => {
            Some(format!("{} critical finding(s) present", counts.critical))
        }
        Verdict::Fail => Some(format!(
            "{} high-severity finding(s) present",
            counts.high
        )),
        Verdict::NeedsRevision => Some(format!(
            "{} high-severity finding(s) need revision",
            counts.high
        )),
        Verdict::NeedsImprovement => Some(format!(
            "{} medium-severity finding(s) need improvement",
            counts.medium
        )),
    }
}
