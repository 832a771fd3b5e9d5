//! Confidence scoring for correction attempts.
//!
//! Blends four independent sub-scores into one `overall` value:
//!
//! ```text
//! overall = clamp(0, 1, 0.3*diagnostic + 0.3*fix + 0.4*test_coverage - iteration_penalty)
//! ```
//!
//! The correction loop compares `overall` against its escalation threshold to
//! decide between autonomous continuation and a human decision.

use serde::{Deserialize, Serialize};

use crate::domain::{CorrectionAttempt, DiagnosticReport, FixProposal, TestResult};

/// Weight of the diagnostic sub-score.
pub const DIAGNOSTIC_WEIGHT: f64 = 0.3;
/// Weight of the fix sub-score.
pub const FIX_WEIGHT: f64 = 0.3;
/// Weight of the test-evidence sub-score.
pub const TEST_COVERAGE_WEIGHT: f64 = 0.4;

/// `overall` at or above this is high confidence.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;
/// `overall` below this is low confidence.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

const SHORT_ROOT_CAUSE_CHARS: usize = 50;
const SHORT_ROOT_CAUSE_FACTOR: f64 = 0.9;
const GENERIC_SEARCH_CHARS: usize = 10;
const GENERIC_SEARCH_FACTOR: f64 = 0.85;
const FAILED_ATTEMPT_PENALTY: f64 = 0.1;

const NO_TEST_RESULT_CONFIDENCE: f64 = 0.5;
const UNPARSEABLE_TEST_CONFIDENCE: f64 = 0.4;
const PASS_RATE_WEIGHT: f64 = 0.7;
const COVERAGE_WEIGHT: f64 = 0.3;
const UNKNOWN_COVERAGE_FACTOR: f64 = 0.8;

const PENALTY_PER_RETRY: f64 = 0.05;
const MAX_ITERATION_PENALTY: f64 = 0.5;

/// Weighted confidence for one correction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub diagnostic_confidence: f64,
    pub fix_confidence: f64,
    pub test_coverage_confidence: f64,
    pub iteration_penalty: f64,
    pub overall: f64,
}

impl ConfidenceBreakdown {
    /// Combine sub-scores with the fixed weights.
    pub fn combine(
        diagnostic_confidence: f64,
        fix_confidence: f64,
        test_coverage_confidence: f64,
        iteration_penalty: f64,
    ) -> Self {
        let overall = clamp_unit(
            DIAGNOSTIC_WEIGHT * diagnostic_confidence
                + FIX_WEIGHT * fix_confidence
                + TEST_COVERAGE_WEIGHT * test_coverage_confidence
                - iteration_penalty,
        );
        Self {
            diagnostic_confidence,
            fix_confidence,
            test_coverage_confidence,
            iteration_penalty,
            overall,
        }
    }

    pub fn is_high_confidence(&self) -> bool {
        self.overall >= HIGH_CONFIDENCE_THRESHOLD
    }

    pub fn is_low_confidence(&self) -> bool {
        self.overall < LOW_CONFIDENCE_THRESHOLD
    }
}

/// Stateless scorer. All methods are pure functions of their inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceEngine;

impl ConfidenceEngine {
    pub fn new() -> Self {
        Self
    }

    /// Score a full attempt.
    ///
    /// `history` is the attempt history *before* this attempt; its failures
    /// penalize the fix sub-score.
    pub fn calculate(
        &self,
        diagnosis: &DiagnosticReport,
        fix: &FixProposal,
        test_result: Option<&TestResult>,
        history: &[CorrectionAttempt],
        iteration: u32,
    ) -> ConfidenceBreakdown {
        ConfidenceBreakdown::combine(
            self.calculate_diagnostic_confidence(diagnosis),
            self.calculate_fix_confidence(fix, history),
            self.calculate_test_coverage_confidence(test_result),
            self.calculate_iteration_penalty(iteration),
        )
    }

    /// Self-reported diagnosis confidence, discounted for diffuse diagnoses.
    pub fn calculate_diagnostic_confidence(&self, diagnosis: &DiagnosticReport) -> f64 {
        let location_factor = match diagnosis.affected_locations.len() {
            0 | 1 => 1.0,
            2 => 0.95,
            3 => 0.9,
            4 => 0.85,
            _ => 0.8,
        };
        let candidate_factor = match diagnosis.candidate_fixes.len() {
            0 | 1 => 1.0,
            2 => 0.95,
            3 | 4 => 0.9,
            _ => 0.85,
        };
        let explanation_factor =
            if diagnosis.root_cause.trim().chars().count() < SHORT_ROOT_CAUSE_CHARS {
                SHORT_ROOT_CAUSE_FACTOR
            } else {
                1.0
            };

        clamp_unit(diagnosis.confidence * location_factor * candidate_factor * explanation_factor)
    }

    /// Self-reported fix confidence, discounted for sprawling or generic
    /// edits and for every failed attempt already in history.
    pub fn calculate_fix_confidence(&self, fix: &FixProposal, history: &[CorrectionAttempt]) -> f64 {
        let change_factor = match fix.changes.len() {
            0 | 1 => 1.0,
            2 | 3 => 0.95,
            4 | 5 => 0.9,
            _ => 0.8,
        };
        let file_factor = match fix.files_touched().len() {
            0 | 1 => 1.0,
            2 => 0.95,
            3 => 0.9,
            _ => 0.85,
        };
        let pattern_factor = if fix
            .changes
            .iter()
            .any(|c| c.search.chars().count() < GENERIC_SEARCH_CHARS)
        {
            GENERIC_SEARCH_FACTOR
        } else {
            1.0
        };

        let failed_attempts = history.iter().filter(|a| a.is_failure()).count() as f64;
        let score = fix.confidence * change_factor * file_factor * pattern_factor
            - FAILED_ATTEMPT_PENALTY * failed_attempts;
        clamp_unit(score)
    }

    /// Trust in the test evidence itself.
    pub fn calculate_test_coverage_confidence(&self, test_result: Option<&TestResult>) -> f64 {
        let Some(result) = test_result else {
            return NO_TEST_RESULT_CONFIDENCE;
        };
        if result.parsing_failed {
            return UNPARSEABLE_TEST_CONFIDENCE;
        }

        let coverage_factor = result
            .coverage_percent
            .map(|pct| clamp_unit(pct / 100.0))
            .unwrap_or(UNKNOWN_COVERAGE_FACTOR);
        clamp_unit(PASS_RATE_WEIGHT * result.pass_rate() + COVERAGE_WEIGHT * coverage_factor)
    }

    /// 0 on the first attempt, +5 points per retry, capped at 50%.
    pub fn calculate_iteration_penalty(&self, iteration: u32) -> f64 {
        let retries = f64::from(iteration.saturating_sub(1));
        (PENALTY_PER_RETRY * retries).min(MAX_ITERATION_PENALTY)
    }
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
