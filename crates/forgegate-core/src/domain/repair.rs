//! Correction collaborator payloads: diagnoses, fix proposals, test results.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finding::Location;
use crate::confidence::ConfidenceBreakdown;

/// A search/replace edit against one file of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChange {
    pub file_path: String,
    pub search: String,
    pub replace: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CodeChange {
    pub fn new(
        file_path: impl Into<String>,
        search: impl Into<String>,
        replace: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            search: search.into(),
            replace: replace.into(),
            description: None,
        }
    }

    /// A change that would actually edit something: non-empty search text
    /// that differs from the replacement.
    pub fn is_non_trivial(&self) -> bool {
        !self.search.is_empty() && self.search != self.replace
    }
}

/// One candidate fix named by a diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFix {
    pub description: String,
    pub changes: Vec<CodeChange>,
}

/// Root-cause analysis of a failing artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub root_cause: String,
    pub affected_locations: Vec<Location>,
    pub candidate_fixes: Vec<CandidateFix>,
    /// Self-reported confidence in [0, 1].
    pub confidence: f64,
}

impl DiagnosticReport {
    /// Check the structural contract a diagnosis must meet before a fix is
    /// proposed from it.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.affected_locations.is_empty() {
            return Err("diagnosis names no affected locations".to_string());
        }
        if self.candidate_fixes.is_empty() {
            return Err("diagnosis names no candidate fixes".to_string());
        }
        for (idx, fix) in self.candidate_fixes.iter().enumerate() {
            if !fix.changes.iter().any(CodeChange::is_non_trivial) {
                return Err(format!(
                    "candidate fix {} has no non-trivial change",
                    idx + 1
                ));
            }
        }
        Ok(())
    }
}

/// A concrete fix proposed for one correction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixProposal {
    pub strategy: String,
    pub changes: Vec<CodeChange>,
    /// Self-reported confidence in [0, 1].
    pub confidence: f64,
}

impl FixProposal {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.changes.is_empty() {
            return Err("fix proposal contains no changes".to_string());
        }
        if !self.changes.iter().any(CodeChange::is_non_trivial) {
            return Err("fix proposal has no non-empty, non-identical search/replace".to_string());
        }
        Ok(())
    }

    /// Distinct files touched by this proposal.
    pub fn files_touched(&self) -> BTreeSet<&str> {
        self.changes.iter().map(|c| c.file_path.as_str()).collect()
    }
}

/// Structured outcome of a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub coverage_percent: Option<f64>,
    /// Set when the runner's output could not be parsed.
    pub parsing_failed: bool,
    #[serde(default)]
    pub failure_messages: Vec<String>,
}

impl TestResult {
    pub fn passing(total: u32) -> Self {
        Self {
            total,
            passed: total,
            failed: 0,
            coverage_percent: None,
            parsing_failed: false,
            failure_messages: Vec::new(),
        }
    }

    pub fn failing(total: u32, failed: u32) -> Self {
        Self {
            total,
            passed: total.saturating_sub(failed),
            failed,
            coverage_percent: None,
            parsing_failed: false,
            failure_messages: Vec::new(),
        }
    }

    pub fn unparseable() -> Self {
        Self {
            total: 0,
            passed: 0,
            failed: 0,
            coverage_percent: None,
            parsing_failed: true,
            failure_messages: Vec::new(),
        }
    }

    pub fn with_coverage(mut self, percent: f64) -> Self {
        self.coverage_percent = Some(percent);
        self
    }

    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure_messages.push(message.into());
        self
    }

    /// Green run: parsed, nothing failed.
    pub fn all_passed(&self) -> bool {
        !self.parsing_failed && self.failed == 0
    }

    /// Passed / total, with zero tests counting as 1.0.
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            f64::from(self.passed) / f64::from(self.total)
        }
    }
}

/// One pass of the correction loop. Appended to history, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionAttempt {
    pub iteration: u32,
    pub changes_applied: Vec<CodeChange>,
    pub test_result: Option<TestResult>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub confidence: Option<ConfidenceBreakdown>,
    pub recorded_at: DateTime<Utc>,
}

impl CorrectionAttempt {
    pub fn is_failure(&self) -> bool {
        !self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(changes: Vec<CodeChange>) -> CandidateFix {
        CandidateFix {
            description: "swap operator".to_string(),
            changes,
        }
    }

    fn diagnosis() -> DiagnosticReport {
        DiagnosticReport {
            root_cause: "subtraction used where addition was intended".to_string(),
            affected_locations: vec![Location::at("calc.py", 2)],
            candidate_fixes: vec![fix(vec![CodeChange::new("calc.py", "a - b", "a + b")])],
            confidence: 0.9,
        }
    }

    #[test]
    fn test_trivial_changes_detected() {
        assert!(!CodeChange::new("a.py", "", "x").is_non_trivial());
        assert!(!CodeChange::new("a.py", "x", "x").is_non_trivial());
        assert!(CodeChange::new("a.py", "x", "").is_non_trivial());
    }

    #[test]
    fn test_diagnosis_validation() {
        assert!(diagnosis().validate().is_ok());

        let mut no_locations = diagnosis();
        no_locations.affected_locations.clear();
        assert!(no_locations.validate().is_err());

        let mut trivial = diagnosis();
        trivial.candidate_fixes = vec![fix(vec![CodeChange::new("calc.py", "a", "a")])];
        let err = trivial.validate().unwrap_err();
        assert!(err.contains("candidate fix 1"));
    }

    #[test]
    fn test_fix_proposal_validation() {
        let empty = FixProposal {
            strategy: "noop".to_string(),
            changes: vec![],
            confidence: 0.5,
        };
        assert!(empty.validate().is_err());

        let ok = FixProposal {
            strategy: "swap operator".to_string(),
            changes: vec![
                CodeChange::new("calc.py", "a - b", "a + b"),
                CodeChange::new("calc.py", "x", "y"),
            ],
            confidence: 0.8,
        };
        assert!(ok.validate().is_ok());
        assert_eq!(ok.files_touched().len(), 1);
    }

    #[test]
    fn test_pass_rate_zero_tests_is_one() {
        assert_eq!(TestResult::passing(0).pass_rate(), 1.0);
        assert_eq!(TestResult::failing(4, 1).pass_rate(), 0.75);
        assert!(!TestResult::unparseable().all_passed());
    }
}
