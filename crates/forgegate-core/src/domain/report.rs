//! Aggregated review report and gate verdicts.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::artifact::ContentDigest;
use super::finding::{Finding, Severity, Suggestion};

/// Quality gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    NeedsImprovement,
    NeedsRevision,
    Fail,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::NeedsImprovement => "NEEDS_IMPROVEMENT",
            Verdict::NeedsRevision => "NEEDS_REVISION",
            Verdict::Fail => "FAIL",
        }
    }

    pub fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-severity finding counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl SeverityCounts {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for f in findings {
            counts.record(f.severity);
        }
        counts
    }

    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low
    }
}

/// Structural sanity check computed independently of specialist judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatedCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// A specialist item that could not be repaired and was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedItem {
    pub reviewer: String,
    /// `finding` or `suggestion`.
    pub item_kind: String,
    /// Position in the reviewer's raw output.
    pub index: usize,
    pub reason: String,
}

/// One deduplicated, canonically-identified review of a phase artifact.
///
/// # Invariants
///
/// - `severity_counts.total() == findings.len()`
/// - every `Suggestion::related_finding_id` names a finding in `findings`,
///   or is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub findings: Vec<Finding>,
    pub suggestions: Vec<Suggestion>,
    pub severity_counts: SeverityCounts,
    pub verdict: Verdict,
    pub automated_checks: Vec<AutomatedCheck>,
    pub duration_ms: u64,
    /// Reviewers whose output was aggregated, in dispatch order.
    pub reviewers: Vec<String>,
    /// Reviewers that errored and were substituted with an empty result.
    pub failed_reviewers: Vec<String>,
    pub dropped: Vec<DroppedItem>,
    /// Number of normalization repairs applied across all items.
    pub repairs_applied: usize,
    pub artifact_digest: Option<ContentDigest>,
}

impl AggregatedReport {
    /// Look up a finding by canonical ID.
    pub fn finding(&self, id: &str) -> Option<&Finding> {
        self.findings.iter().find(|f| f.id == id)
    }

    /// Related-finding references that do not resolve. Empty for any report
    /// produced by the aggregator.
    pub fn dangling_references(&self) -> Vec<&str> {
        let ids: HashSet<&str> = self.findings.iter().map(|f| f.id.as_str()).collect();
        self.suggestions
            .iter()
            .filter_map(|s| s.related_finding_id.as_deref())
            .filter(|id| !ids.contains(id))
            .collect()
    }

    /// Check both report invariants.
    pub fn is_consistent(&self) -> bool {
        self.severity_counts.total() as usize == self.findings.len()
            && self.dangling_references().is_empty()
    }

    /// Whether every automated check passed.
    pub fn automated_checks_passed(&self) -> bool {
        self.automated_checks.iter().all(|c| c.passed)
    }
}
