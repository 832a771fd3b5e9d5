//! Bounded diagnose → propose → apply → verify correction loop.
//!
//! Each iteration starts from the last good artifact and is diagnosed
//! against the most recent failing test result. A failed attempt is
//! rolled back, scored with the [`ConfidenceEngine`] and then either retried
//! autonomously, escalated to an [`ApprovalGateway`], or (at the iteration
//! budget) reported as exhausted.
//!
//! ```text
//! Diagnosing ─▶ Proposing ─▶ Applying ─▶ Verifying ─▶ Succeeded
//!     ▲                          │            │
//!     │                          └─▶ RolledBack ◀─┘
//!     │                                 │
//!     └──── RetryDiagnosing ◀── (approved / confident)
//!                                       ├─▶ Escalated  (error)
//!                                       └─▶ Exhausted  (budget)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use forgegate_core::obs::{emit_correction_attempt, emit_escalation};
use forgegate_core::{
    ApprovalGateway, ApprovalRequest, CodeChange, ConfidenceBreakdown, ConfidenceEngine,
    CorrectionAttempt, DiagnosticReport, FixProposal, Result, TestResult, WorkArtifact,
    LOW_CONFIDENCE_THRESHOLD, METRICS,
};

use crate::error::CorrectionError;

/// Gate name used in escalation requests and logs.
pub const CORRECTION_GATE: &str = "correction_loop";

/// Default iteration budget.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Proposes a root cause and candidate fixes for a failing artifact.
#[async_trait]
pub trait Diagnoser: Send + Sync {
    async fn diagnose(&self, artifact: &WorkArtifact, evidence: &TestResult) -> Result<DiagnosticReport>;
}

/// Turns a diagnosis into concrete changes. Sees the full attempt history so
/// it can avoid repeating failed strategies.
#[async_trait]
pub trait FixProposer: Send + Sync {
    async fn propose_fix(
        &self,
        diagnosis: &DiagnosticReport,
        history: &[CorrectionAttempt],
    ) -> Result<FixProposal>;
}

/// Runs the test suite against an artifact.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_tests(&self, artifact: &WorkArtifact) -> Result<TestResult>;
}

/// Applies changes transactionally and restores a base artifact.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    /// All-or-nothing: either every change applies or an error is returned
    /// and nothing is produced.
    async fn apply(&self, base: &WorkArtifact, changes: &[CodeChange]) -> Result<WorkArtifact>;

    /// Discard any edit made on top of `base`.
    async fn rollback(&self, base: &WorkArtifact) -> Result<()>;
}

/// Applier for in-memory artifacts. Artifacts are immutable, so rollback
/// only has to drop the candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryApplier;

#[async_trait]
impl ChangeApplier for InMemoryApplier {
    async fn apply(&self, base: &WorkArtifact, changes: &[CodeChange]) -> Result<WorkArtifact> {
        base.supersede(changes)
    }

    async fn rollback(&self, base: &WorkArtifact) -> Result<()> {
        debug!(digest = %base.digest.short(), "rolled back to base artifact");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration & state
// ---------------------------------------------------------------------------

/// Whether the loop may continue without a human.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyMode {
    /// Escalate only when confidence is below the threshold.
    #[default]
    Autonomous,
    /// Escalate after every failed attempt.
    Supervised,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub max_iterations: u32,
    /// Escalate when `overall` confidence is below this.
    pub escalation_threshold: f64,
    pub mode: AutonomyMode,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            escalation_threshold: LOW_CONFIDENCE_THRESHOLD,
            mode: AutonomyMode::Autonomous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Diagnosing,
    Proposing,
    Applying,
    Verifying,
    Succeeded,
    RetryDiagnosing,
    RolledBack,
    Escalated,
    Exhausted,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopState::Diagnosing => "diagnosing",
            LoopState::Proposing => "proposing",
            LoopState::Applying => "applying",
            LoopState::Verifying => "verifying",
            LoopState::Succeeded => "succeeded",
            LoopState::RetryDiagnosing => "retry_diagnosing",
            LoopState::RolledBack => "rolled_back",
            LoopState::Escalated => "escalated",
            LoopState::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One visited state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub iteration: u32,
    pub state: LoopState,
}

/// Non-error terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Succeeded,
    Exhausted,
}

/// Result of a loop that ran to a non-error terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionOutcome {
    pub task_id: String,
    pub status: LoopStatus,
    pub success: bool,
    pub iterations_used: u32,
    pub attempts: Vec<CorrectionAttempt>,
    /// The fixed artifact on success, the untouched input otherwise.
    pub final_artifact: WorkArtifact,
    pub last_confidence: Option<ConfidenceBreakdown>,
    pub transitions: Vec<Transition>,
}

impl CorrectionOutcome {
    pub fn visited(&self, state: LoopState) -> bool {
        self.transitions.iter().any(|t| t.state == state)
    }
}

#[derive(Default)]
struct Trail(Vec<Transition>);

impl Trail {
    fn enter(&mut self, iteration: u32, state: LoopState) {
        debug!(iteration, state = %state, "correction state");
        self.0.push(Transition { iteration, state });
    }
}

fn failed_attempt(
    iteration: u32,
    changes: &[CodeChange],
    test_result: Option<TestResult>,
    reason: String,
    confidence: Option<ConfidenceBreakdown>,
) -> CorrectionAttempt {
    CorrectionAttempt {
        iteration,
        changes_applied: changes.to_vec(),
        test_result,
        success: false,
        failure_reason: Some(reason),
        confidence,
        recorded_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// CorrectionLoop
// ---------------------------------------------------------------------------

pub struct CorrectionLoop {
    config: CorrectionConfig,
    engine: ConfidenceEngine,
    diagnoser: Arc<dyn Diagnoser>,
    proposer: Arc<dyn FixProposer>,
    tests: Arc<dyn TestRunner>,
    applier: Arc<dyn ChangeApplier>,
    approver: Option<Arc<dyn ApprovalGateway>>,
}

impl CorrectionLoop {
    pub fn new(
        config: CorrectionConfig,
        diagnoser: Arc<dyn Diagnoser>,
        proposer: Arc<dyn FixProposer>,
        tests: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            config,
            engine: ConfidenceEngine::new(),
            diagnoser,
            proposer,
            tests,
            applier: Arc::new(InMemoryApplier),
            approver: None,
        }
    }

    pub fn with_applier(mut self, applier: Arc<dyn ChangeApplier>) -> Self {
        self.applier = applier;
        self
    }

    pub fn with_approver(mut self, approver: Arc<dyn ApprovalGateway>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Repair `artifact`, whose tests failed with `evidence`.
    ///
    /// Returns `Ok` for `Succeeded` and `Exhausted`; invariant violations,
    /// missing approvers, rejections and collaborator failures are errors.
    pub async fn run(
        &self,
        task_id: &str,
        artifact: &WorkArtifact,
        evidence: &TestResult,
    ) -> std::result::Result<CorrectionOutcome, CorrectionError> {
        let max_iterations = self.config.max_iterations.max(1);
        let base = artifact;
        let mut history: Vec<CorrectionAttempt> = Vec::new();
        let mut trail = Trail::default();
        let mut last_confidence: Option<ConfidenceBreakdown> = None;
        let mut latest_evidence = evidence.clone();

        info!(
            task_id = %task_id,
            max_iterations,
            mode = ?self.config.mode,
            "correction loop started"
        );

        for iteration in 1..=max_iterations {
            METRICS.inc_correction_iterations();
            trail.enter(
                iteration,
                if iteration == 1 {
                    LoopState::Diagnosing
                } else {
                    LoopState::RetryDiagnosing
                },
            );
            let diagnosis = self
                .diagnose_checked(base, &latest_evidence, iteration, &mut history, last_confidence)
                .await?;

            trail.enter(iteration, LoopState::Proposing);
            let proposal = self
                .propose_checked(&diagnosis, iteration, &mut history, last_confidence)
                .await?;

            trail.enter(iteration, LoopState::Applying);
            let (test_result, reason) = match self.applier.apply(base, &proposal.changes).await {
                Err(e) => {
                    warn!(task_id = %task_id, iteration, error = %e, "apply failed; discarding partial edit");
                    (None, format!("apply failed: {e}"))
                }
                Ok(candidate) => {
                    trail.enter(iteration, LoopState::Verifying);
                    let result = self.tests.run_tests(&candidate).await.map_err(|source| {
                        CorrectionError::Collaborator {
                            stage: LoopState::Verifying,
                            source,
                            attempts: history.clone(),
                            confidence: last_confidence,
                        }
                    })?;

                    if result.all_passed() {
                        let confidence = self.engine.calculate(
                            &diagnosis,
                            &proposal,
                            Some(&result),
                            &history,
                            iteration,
                        );
                        history.push(CorrectionAttempt {
                            iteration,
                            changes_applied: proposal.changes.clone(),
                            test_result: Some(result),
                            success: true,
                            failure_reason: None,
                            confidence: Some(confidence),
                            recorded_at: Utc::now(),
                        });
                        trail.enter(iteration, LoopState::Succeeded);
                        emit_correction_attempt(task_id, iteration, true, Some(confidence.overall));
                        info!(task_id = %task_id, iteration, "correction succeeded");
                        return Ok(CorrectionOutcome {
                            task_id: task_id.to_string(),
                            status: LoopStatus::Succeeded,
                            success: true,
                            iterations_used: iteration,
                            attempts: history,
                            final_artifact: candidate,
                            last_confidence: Some(confidence),
                            transitions: trail.0,
                        });
                    }

                    let reason = format!("{} of {} tests failed", result.failed, result.total);
                    (Some(result), reason)
                }
            };

            // Either the apply failed part-way or the candidate failed its
            // tests; in both cases the next attempt starts from `base`.
            self.rollback(base, iteration, &mut trail, &history, last_confidence)
                .await?;

            let confidence = self.engine.calculate(
                &diagnosis,
                &proposal,
                test_result.as_ref(),
                &history,
                iteration,
            );
            last_confidence = Some(confidence);
            if let Some(result) = &test_result {
                latest_evidence = result.clone();
            }
            history.push(failed_attempt(
                iteration,
                &proposal.changes,
                test_result,
                reason,
                Some(confidence),
            ));
            emit_correction_attempt(task_id, iteration, false, Some(confidence.overall));

            if iteration >= max_iterations {
                break;
            }

            self.maybe_escalate(task_id, iteration, confidence, &history, &mut trail)
                .await?;
        }

        trail.enter(max_iterations, LoopState::Exhausted);
        warn!(
            task_id = %task_id,
            iterations = max_iterations,
            "correction budget exhausted"
        );
        Ok(CorrectionOutcome {
            task_id: task_id.to_string(),
            status: LoopStatus::Exhausted,
            success: false,
            iterations_used: max_iterations,
            attempts: history,
            final_artifact: base.clone(),
            last_confidence,
            transitions: trail.0,
        })
    }

    async fn diagnose_checked(
        &self,
        artifact: &WorkArtifact,
        evidence: &TestResult,
        iteration: u32,
        history: &mut Vec<CorrectionAttempt>,
        last_confidence: Option<ConfidenceBreakdown>,
    ) -> std::result::Result<DiagnosticReport, CorrectionError> {
        let mut last_reason = String::new();
        for try_no in 0..2 {
            let diagnosis = self
                .diagnoser
                .diagnose(artifact, evidence)
                .await
                .map_err(|source| CorrectionError::Collaborator {
                    stage: LoopState::Diagnosing,
                    source,
                    attempts: history.clone(),
                    confidence: last_confidence,
                })?;
            match diagnosis.validate() {
                Ok(()) => return Ok(diagnosis),
                Err(reason) => {
                    warn!(iteration, try_no, reason = %reason, "invalid diagnosis");
                    last_reason = reason;
                }
            }
        }

        history.push(failed_attempt(
            iteration,
            &[],
            None,
            format!("invalid diagnosis: {last_reason}"),
            None,
        ));
        Err(CorrectionError::InvariantViolation {
            stage: LoopState::Diagnosing,
            reason: last_reason,
            attempts: history.clone(),
            confidence: last_confidence,
        })
    }

    async fn propose_checked(
        &self,
        diagnosis: &DiagnosticReport,
        iteration: u32,
        history: &mut Vec<CorrectionAttempt>,
        last_confidence: Option<ConfidenceBreakdown>,
    ) -> std::result::Result<FixProposal, CorrectionError> {
        let mut last_reason = String::new();
        for try_no in 0..2 {
            let proposal = self
                .proposer
                .propose_fix(diagnosis, history.as_slice())
                .await
                .map_err(|source| CorrectionError::Collaborator {
                    stage: LoopState::Proposing,
                    source,
                    attempts: history.clone(),
                    confidence: last_confidence,
                })?;
            match proposal.validate() {
                Ok(()) => return Ok(proposal),
                Err(reason) => {
                    warn!(iteration, try_no, reason = %reason, "invalid fix proposal");
                    last_reason = reason;
                }
            }
        }

        history.push(failed_attempt(
            iteration,
            &[],
            None,
            format!("invalid fix proposal: {last_reason}"),
            None,
        ));
        Err(CorrectionError::InvariantViolation {
            stage: LoopState::Proposing,
            reason: last_reason,
            attempts: history.clone(),
            confidence: last_confidence,
        })
    }

    async fn rollback(
        &self,
        base: &WorkArtifact,
        iteration: u32,
        trail: &mut Trail,
        history: &[CorrectionAttempt],
        last_confidence: Option<ConfidenceBreakdown>,
    ) -> std::result::Result<(), CorrectionError> {
        self.applier
            .rollback(base)
            .await
            .map_err(|source| CorrectionError::Collaborator {
                stage: LoopState::RolledBack,
                source,
                attempts: history.to_vec(),
                confidence: last_confidence,
            })?;
        METRICS.inc_rollbacks();
        trail.enter(iteration, LoopState::RolledBack);
        Ok(())
    }

    /// Ask for approval when confidence is low or the loop is supervised.
    async fn maybe_escalate(
        &self,
        task_id: &str,
        iteration: u32,
        confidence: ConfidenceBreakdown,
        history: &[CorrectionAttempt],
        trail: &mut Trail,
    ) -> std::result::Result<(), CorrectionError> {
        let trigger = match self.config.mode {
            AutonomyMode::Supervised => "supervised mode requires approval".to_string(),
            AutonomyMode::Autonomous if confidence.overall < self.config.escalation_threshold => {
                format!(
                    "confidence {:.3} below threshold {:.3}",
                    confidence.overall, self.config.escalation_threshold
                )
            }
            AutonomyMode::Autonomous => return Ok(()),
        };

        emit_escalation(task_id, CORRECTION_GATE, &trigger);

        let Some(approver) = &self.approver else {
            trail.enter(iteration, LoopState::Escalated);
            return Err(CorrectionError::EscalationRequired {
                reason: "no approver available".to_string(),
                attempts: history.to_vec(),
                confidence: Some(confidence),
            });
        };

        let response = approver
            .request_approval(ApprovalRequest::escalation(
                task_id,
                CORRECTION_GATE,
                Some(confidence),
                trigger,
            ))
            .await
            .map_err(|source| CorrectionError::Collaborator {
                stage: LoopState::Escalated,
                source,
                attempts: history.to_vec(),
                confidence: Some(confidence),
            })?;

        if response.decision.is_approved() {
            info!(
                task_id = %task_id,
                iteration,
                reviewer = %response.reviewer,
                "escalation approved; continuing"
            );
            return Ok(());
        }

        trail.enter(iteration, LoopState::Escalated);
        Err(CorrectionError::Rejected {
            reviewer: response.reviewer,
            justification: response.justification,
            attempts: history.to_vec(),
            confidence: Some(confidence),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgegate_core::{ArtifactKind, CandidateFix, Location};

    struct Fixed(DiagnosticReport, FixProposal, bool);

    #[async_trait]
    impl Diagnoser for Fixed {
        async fn diagnose(&self, _: &WorkArtifact, _: &TestResult) -> Result<DiagnosticReport> {
            Ok(self.0.clone())
        }
    }

    #[async_trait]
    impl FixProposer for Fixed {
        async fn propose_fix(&self, _: &DiagnosticReport, _: &[CorrectionAttempt]) -> Result<FixProposal> {
            Ok(self.1.clone())
        }
    }

    #[async_trait]
    impl TestRunner for Fixed {
        async fn run_tests(&self, _: &WorkArtifact) -> Result<TestResult> {
            Ok(if self.2 {
                TestResult::passing(3)
            } else {
                TestResult::failing(3, 1)
            })
        }
    }

    fn fixed(passes: bool) -> Arc<Fixed> {
        let change = CodeChange::new("calc.py", "return a - b", "return a + b");
        Arc::new(Fixed(
            DiagnosticReport {
                root_cause: "add() subtracts its second operand instead of adding it".to_string(),
                affected_locations: vec![Location::at("calc.py", 2)],
                candidate_fixes: vec![CandidateFix {
                    description: "use addition".to_string(),
                    changes: vec![change.clone()],
                }],
                confidence: 0.9,
            },
            FixProposal {
                strategy: "swap operator".to_string(),
                changes: vec![change],
                confidence: 0.9,
            },
            passes,
        ))
    }

    fn artifact() -> WorkArtifact {
        WorkArtifact::single(ArtifactKind::Code, "calc.py", "def add(a, b):\n    return a - b\n")
    }

    fn looped(config: CorrectionConfig, collab: Arc<Fixed>) -> CorrectionLoop {
        CorrectionLoop::new(config, collab.clone(), collab.clone(), collab)
    }

    #[tokio::test]
    async fn test_trail_on_success() {
        let outcome = looped(CorrectionConfig::default(), fixed(true))
            .run("t", &artifact(), &TestResult::failing(3, 1))
            .await
            .unwrap();

        let states: Vec<LoopState> = outcome.transitions.iter().map(|t| t.state).collect();
        assert_eq!(
            states,
            vec![
                LoopState::Diagnosing,
                LoopState::Proposing,
                LoopState::Applying,
                LoopState::Verifying,
                LoopState::Succeeded
            ]
        );
        assert_eq!(outcome.final_artifact.revision, 1);
        assert!(outcome.final_artifact.files["calc.py"].contains("a + b"));
    }

    #[tokio::test]
    async fn test_confident_failures_retry_until_budget() {
        let config = CorrectionConfig {
            max_iterations: 3,
            ..Default::default()
        };
        let outcome = looped(config, fixed(false))
            .run("t", &artifact(), &TestResult::failing(3, 1))
            .await
            .unwrap();

        assert_eq!(outcome.status, LoopStatus::Exhausted);
        assert_eq!(outcome.iterations_used, 3);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.visited(LoopState::RetryDiagnosing));
        assert!(!outcome.visited(LoopState::Escalated));
        assert_eq!(outcome.final_artifact.revision, 0);
        // Each failure penalizes the next attempt's fix score.
        let fix_scores: Vec<f64> = outcome
            .attempts
            .iter()
            .map(|a| a.confidence.unwrap().fix_confidence)
            .collect();
        assert!(fix_scores[0] > fix_scores[1] && fix_scores[1] > fix_scores[2]);
    }

    #[test]
    fn test_config_defaults() {
        let config = CorrectionConfig::default();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.escalation_threshold, 0.5);
        assert_eq!(config.mode, AutonomyMode::Autonomous);
        assert_eq!(LoopState::RetryDiagnosing.to_string(), "retry_diagnosing");
    }
}
