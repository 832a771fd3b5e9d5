//! Error types for the correction loop and the phase orchestrator.
//!
//! Every variant carries enough structured context (report, attempt
//! history, confidence) for a caller to act on it programmatically.
//! Budget exhaustion is not an error; see `CorrectionOutcome`.

use forgegate_core::{AggregatedReport, ConfidenceBreakdown, CorrectionAttempt, ForgeError, Phase, Verdict};

use crate::correction::LoopState;
use crate::orchestrator::ExecutionResult;

/// Terminal failures of one correction-loop invocation.
#[derive(Debug, thiserror::Error)]
pub enum CorrectionError {
    /// A diagnosis or proposal was structurally invalid twice in a row.
    #[error("{stage} produced invalid output after one retry: {reason}")]
    InvariantViolation {
        stage: LoopState,
        reason: String,
        attempts: Vec<CorrectionAttempt>,
        confidence: Option<ConfidenceBreakdown>,
    },

    /// Escalation was needed but nobody could be asked.
    #[error("correction escalation required: {reason}")]
    EscalationRequired {
        reason: String,
        attempts: Vec<CorrectionAttempt>,
        confidence: Option<ConfidenceBreakdown>,
    },

    /// The approver explicitly refused further iterations.
    #[error("correction rejected by {reviewer}: {justification}")]
    Rejected {
        reviewer: String,
        justification: String,
        attempts: Vec<CorrectionAttempt>,
        confidence: Option<ConfidenceBreakdown>,
    },

    #[error("collaborator failed while {stage}: {source}")]
    Collaborator {
        stage: LoopState,
        #[source]
        source: ForgeError,
        attempts: Vec<CorrectionAttempt>,
        confidence: Option<ConfidenceBreakdown>,
    },
}

impl CorrectionError {
    /// Attempt history up to the failure.
    pub fn attempts(&self) -> &[CorrectionAttempt] {
        match self {
            Self::InvariantViolation { attempts, .. }
            | Self::EscalationRequired { attempts, .. }
            | Self::Rejected { attempts, .. }
            | Self::Collaborator { attempts, .. } => attempts.as_slice(),
        }
    }

    /// Confidence of the last scored attempt, if any attempt was scored.
    pub fn last_confidence(&self) -> Option<ConfidenceBreakdown> {
        match self {
            Self::InvariantViolation { confidence, .. }
            | Self::EscalationRequired { confidence, .. }
            | Self::Rejected { confidence, .. }
            | Self::Collaborator { confidence, .. } => *confidence,
        }
    }
}

/// Fatal pipeline failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("quality gate '{gate}' blocked with verdict {verdict}: {reason}")]
    QualityGateFailure {
        gate: String,
        verdict: Verdict,
        reason: String,
        report: Box<AggregatedReport>,
        partial: Option<Box<ExecutionResult>>,
    },

    #[error("override for quality gate '{gate}' rejected by {reviewer}: {justification}")]
    RejectedOverride {
        gate: String,
        reviewer: String,
        justification: String,
        report: Box<AggregatedReport>,
        partial: Option<Box<ExecutionResult>>,
    },

    #[error("correction failed in phase {phase}: {source}")]
    Correction {
        phase: Phase,
        #[source]
        source: CorrectionError,
        partial: Option<Box<ExecutionResult>>,
    },

    #[error("artifact production failed in phase {phase}: {source}")]
    Artifact {
        phase: Phase,
        #[source]
        source: ForgeError,
    },

    #[error("approval request for quality gate '{gate}' failed: {source}")]
    Approval {
        gate: String,
        #[source]
        source: ForgeError,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Gate name for gate-level failures.
    pub fn gate(&self) -> Option<&str> {
        match self {
            Self::QualityGateFailure { gate, .. }
            | Self::RejectedOverride { gate, .. }
            | Self::Approval { gate, .. } => Some(gate.as_str()),
            _ => None,
        }
    }

    /// Phases completed, overrides granted and the log recorded before the
    /// run stopped. Set by the orchestrator on gate and correction failures.
    pub fn partial(&self) -> Option<&ExecutionResult> {
        match self {
            Self::QualityGateFailure { partial, .. }
            | Self::RejectedOverride { partial, .. }
            | Self::Correction { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn with_partial(mut self, result: ExecutionResult) -> Self {
        match &mut self {
            Self::QualityGateFailure { partial, .. }
            | Self::RejectedOverride { partial, .. }
            | Self::Correction { partial, .. } => *partial = Some(Box::new(result)),
            _ => {}
        }
        self
    }

    /// The blocking report, when the failure came from a gate.
    pub fn report(&self) -> Option<&AggregatedReport> {
        match self {
            Self::QualityGateFailure { report, .. } | Self::RejectedOverride { report, .. } => {
                Some(report.as_ref())
            }
            _ => None,
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
