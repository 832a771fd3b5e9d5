use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forgegate_core::fakes::StaticApprover;
use forgegate_core::{
    ArtifactKind, CodeChange, DiagnosticReport, ForgeError, GateType, Result, TestResult,
    WorkArtifact,
};
use forgegate_pipeline::fakes::{
    diagnosis_for, proposal_for, ContentTestRunner, CountingApplier, ScriptedDiagnoser,
    ScriptedFixProposer, ScriptedTestRunner,
};
use forgegate_pipeline::{
    AutonomyMode, CorrectionConfig, CorrectionError, CorrectionLoop, Diagnoser, LoopState,
    LoopStatus, TestRunner,
};

const BROKEN: &str = "def add(a, b):\n    return a - b\n";

fn broken_artifact() -> WorkArtifact {
    WorkArtifact::single(ArtifactKind::Code, "calc.py", BROKEN)
}

fn good_change() -> CodeChange {
    CodeChange::new("calc.py", "return a - b", "return a + b")
}

/// Applies cleanly but leaves the test failing.
fn wrong_change() -> CodeChange {
    CodeChange::new("calc.py", "return a - b", "return b - a")
}

/// Search text that is not in the file.
fn unappliable_change() -> CodeChange {
    CodeChange::new("calc.py", "return a * b", "return a + b")
}

fn initial_failure() -> TestResult {
    TestResult::failing(4, 1).with_failure("test_add: expected 3, got -1")
}

fn tests() -> Arc<ContentTestRunner> {
    Arc::new(ContentTestRunner::new("calc.py", "a + b"))
}

// ---- Success ----

#[tokio::test]
async fn fix_on_first_iteration_succeeds_without_escalation() {
    let approver = Arc::new(StaticApprover::rejecting("alice"));
    let applier = Arc::new(CountingApplier::new());
    let correction = CorrectionLoop::new(
        CorrectionConfig::default(),
        Arc::new(ScriptedDiagnoser::always(diagnosis_for(&good_change(), 0.9))),
        Arc::new(ScriptedFixProposer::always(proposal_for(&good_change(), 0.9))),
        tests(),
    )
    .with_applier(applier.clone())
    .with_approver(approver.clone());

    let outcome = correction
        .run("task-1", &broken_artifact(), &initial_failure())
        .await
        .unwrap();

    assert_eq!(outcome.status, LoopStatus::Succeeded);
    assert!(outcome.success);
    assert_eq!(outcome.iterations_used, 1);
    assert_eq!(outcome.attempts.len(), 1);
    assert!(outcome.final_artifact.files["calc.py"].contains("return a + b"));
    assert!(outcome.last_confidence.unwrap().overall > 0.5);
    assert_eq!(approver.call_count(), 0);
    assert_eq!(applier.rollback_count(), 0);
    assert!(!outcome.visited(LoopState::Escalated));
}

#[tokio::test]
async fn apply_failure_rolls_back_and_next_proposal_sees_history() {
    let proposer = Arc::new(ScriptedFixProposer::new(vec![
        proposal_for(&unappliable_change(), 0.9),
        proposal_for(&good_change(), 0.9),
    ]));
    let applier = Arc::new(CountingApplier::new());
    let correction = CorrectionLoop::new(
        CorrectionConfig::default(),
        Arc::new(ScriptedDiagnoser::always(diagnosis_for(&good_change(), 0.9))),
        proposer.clone(),
        tests(),
    )
    .with_applier(applier.clone());

    let outcome = correction
        .run("task-2", &broken_artifact(), &initial_failure())
        .await
        .unwrap();

    assert_eq!(outcome.status, LoopStatus::Succeeded);
    assert_eq!(outcome.iterations_used, 2);
    assert_eq!(applier.apply_count(), 2);
    assert_eq!(applier.rollback_count(), 1);
    assert_eq!(proposer.history_lens(), vec![0, 1]);

    let first = &outcome.attempts[0];
    assert!(first.is_failure());
    assert!(first.test_result.is_none());
    assert!(first
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("apply failed"));
    // The winning edit was applied to the original, not to a partial edit.
    assert_eq!(outcome.final_artifact.revision, 1);
}

// ---- Budget ----

#[tokio::test]
async fn single_iteration_budget_exhausts_with_one_rollback() {
    let applier = Arc::new(CountingApplier::new());
    let correction = CorrectionLoop::new(
        CorrectionConfig {
            max_iterations: 1,
            ..Default::default()
        },
        Arc::new(ScriptedDiagnoser::always(diagnosis_for(&wrong_change(), 0.9))),
        Arc::new(ScriptedFixProposer::always(proposal_for(&wrong_change(), 0.9))),
        tests(),
    )
    .with_applier(applier.clone());

    let base = broken_artifact();
    let outcome = correction.run("task-3", &base, &initial_failure()).await.unwrap();

    assert_eq!(outcome.status, LoopStatus::Exhausted);
    assert!(!outcome.success);
    assert_eq!(outcome.iterations_used, 1);
    assert_eq!(applier.rollback_count(), 1);
    assert_eq!(outcome.final_artifact, base);
    assert!(outcome.visited(LoopState::Exhausted));
    assert!(outcome.last_confidence.is_some());
}

// ---- Escalation ----

#[tokio::test]
async fn supervised_rejection_stops_before_next_iteration() {
    let diagnoser = Arc::new(ScriptedDiagnoser::always(diagnosis_for(&wrong_change(), 0.9)));
    let approver = Arc::new(StaticApprover::rejecting("alice"));
    let correction = CorrectionLoop::new(
        CorrectionConfig {
            mode: AutonomyMode::Supervised,
            ..Default::default()
        },
        diagnoser.clone(),
        Arc::new(ScriptedFixProposer::always(proposal_for(&wrong_change(), 0.9))),
        tests(),
    )
    .with_approver(approver.clone());

    let err = correction
        .run("task-4", &broken_artifact(), &initial_failure())
        .await
        .unwrap_err();

    match &err {
        CorrectionError::Rejected {
            reviewer, attempts, ..
        } => {
            assert_eq!(reviewer, "alice");
            assert_eq!(attempts.len(), 1);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(err.last_confidence().is_some());
    assert_eq!(diagnoser.call_count(), 1);
    assert_eq!(approver.call_count(), 1);
    assert_eq!(
        approver.requests()[0].gate_type,
        GateType::CorrectionEscalation
    );
}

#[tokio::test]
async fn supervised_approval_continues_to_next_iteration() {
    let approver = Arc::new(StaticApprover::approving("alice"));
    let correction = CorrectionLoop::new(
        CorrectionConfig {
            mode: AutonomyMode::Supervised,
            ..Default::default()
        },
        Arc::new(ScriptedDiagnoser::always(diagnosis_for(&good_change(), 0.9))),
        Arc::new(ScriptedFixProposer::new(vec![
            proposal_for(&wrong_change(), 0.9),
            proposal_for(&good_change(), 0.9),
        ])),
        tests(),
    )
    .with_approver(approver.clone());

    let outcome = correction
        .run("task-5", &broken_artifact(), &initial_failure())
        .await
        .unwrap();

    assert_eq!(outcome.status, LoopStatus::Succeeded);
    assert_eq!(outcome.iterations_used, 2);
    assert_eq!(approver.call_count(), 1);
    assert!(outcome.visited(LoopState::RetryDiagnosing));
}

#[tokio::test]
async fn low_confidence_without_approver_requires_escalation() {
    let correction = CorrectionLoop::new(
        CorrectionConfig::default(),
        Arc::new(ScriptedDiagnoser::always(diagnosis_for(&wrong_change(), 0.2))),
        Arc::new(ScriptedFixProposer::always(proposal_for(&wrong_change(), 0.2))),
        tests(),
    );

    let err = correction
        .run("task-6", &broken_artifact(), &initial_failure())
        .await
        .unwrap_err();

    match &err {
        CorrectionError::EscalationRequired {
            reason, confidence, ..
        } => {
            assert_eq!(reason, "no approver available");
            assert!(confidence.unwrap().overall < 0.5);
        }
        other => panic!("expected EscalationRequired, got {other:?}"),
    }
    assert_eq!(err.attempts().len(), 1);
}

// ---- Invariant violations ----

fn hollow_diagnosis() -> DiagnosticReport {
    DiagnosticReport {
        root_cause: "unknown".to_string(),
        affected_locations: vec![],
        candidate_fixes: vec![],
        confidence: 0.9,
    }
}

#[tokio::test]
async fn invalid_diagnosis_twice_is_an_invariant_violation() {
    let diagnoser = Arc::new(ScriptedDiagnoser::always(hollow_diagnosis()));
    let proposer = Arc::new(ScriptedFixProposer::always(proposal_for(&good_change(), 0.9)));
    let correction = CorrectionLoop::new(
        CorrectionConfig::default(),
        diagnoser.clone(),
        proposer.clone(),
        tests(),
    );

    let err = correction
        .run("task-7", &broken_artifact(), &initial_failure())
        .await
        .unwrap_err();

    match &err {
        CorrectionError::InvariantViolation {
            stage, attempts, ..
        } => {
            assert_eq!(*stage, LoopState::Diagnosing);
            assert_eq!(attempts.len(), 1);
        }
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
    assert_eq!(diagnoser.call_count(), 2);
    assert_eq!(proposer.call_count(), 0);
}

#[tokio::test]
async fn invalid_diagnosis_is_retried_once() {
    let diagnoser = Arc::new(ScriptedDiagnoser::new(vec![
        hollow_diagnosis(),
        diagnosis_for(&good_change(), 0.9),
    ]));
    let correction = CorrectionLoop::new(
        CorrectionConfig::default(),
        diagnoser.clone(),
        Arc::new(ScriptedFixProposer::always(proposal_for(&good_change(), 0.9))),
        tests(),
    );

    let outcome = correction
        .run("task-8", &broken_artifact(), &initial_failure())
        .await
        .unwrap();

    assert_eq!(outcome.status, LoopStatus::Succeeded);
    assert_eq!(outcome.iterations_used, 1);
    assert_eq!(diagnoser.call_count(), 2);
}

// ---- Evidence ----

/// Records the failed count of every evidence it is asked to diagnose.
#[derive(Default)]
struct EvidenceRecorder {
    seen_failed: Mutex<Vec<u32>>,
}

#[async_trait]
impl Diagnoser for EvidenceRecorder {
    async fn diagnose(&self, _artifact: &WorkArtifact, evidence: &TestResult) -> Result<DiagnosticReport> {
        self.seen_failed.lock().unwrap().push(evidence.failed);
        Ok(diagnosis_for(&wrong_change(), 0.9))
    }
}

#[tokio::test]
async fn each_iteration_diagnoses_the_latest_test_result() {
    let diagnoser = Arc::new(EvidenceRecorder::default());
    let correction = CorrectionLoop::new(
        CorrectionConfig {
            max_iterations: 2,
            escalation_threshold: 0.0,
            ..Default::default()
        },
        diagnoser.clone(),
        Arc::new(ScriptedFixProposer::always(proposal_for(&wrong_change(), 0.9))),
        Arc::new(ScriptedTestRunner::new(vec![
            TestResult::failing(4, 3),
            TestResult::failing(4, 2),
        ])),
    );

    let outcome = correction
        .run("task-9", &broken_artifact(), &initial_failure())
        .await
        .unwrap();

    assert_eq!(outcome.status, LoopStatus::Exhausted);
    assert_eq!(*diagnoser.seen_failed.lock().unwrap(), vec![1, 3]);
}

#[tokio::test]
async fn apply_failure_keeps_previous_evidence() {
    let diagnoser = Arc::new(EvidenceRecorder::default());
    let correction = CorrectionLoop::new(
        CorrectionConfig {
            max_iterations: 2,
            ..Default::default()
        },
        diagnoser.clone(),
        Arc::new(ScriptedFixProposer::always(proposal_for(&unappliable_change(), 0.9))),
        tests(),
    );

    let outcome = correction
        .run("task-10", &broken_artifact(), &initial_failure())
        .await
        .unwrap();

    assert_eq!(outcome.status, LoopStatus::Exhausted);
    assert_eq!(*diagnoser.seen_failed.lock().unwrap(), vec![1, 1]);
}

// ---- Collaborator failures ----

/// Fails one test on the first run, then crashes.
#[derive(Default)]
struct CrashingRunner {
    calls: AtomicUsize,
}

#[async_trait]
impl TestRunner for CrashingRunner {
    async fn run_tests(&self, _artifact: &WorkArtifact) -> Result<TestResult> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(TestResult::failing(4, 1))
        } else {
            Err(ForgeError::collaborator("pytest", "crashed"))
        }
    }
}

#[tokio::test]
async fn runner_crash_after_failed_attempt_keeps_history() {
    let correction = CorrectionLoop::new(
        CorrectionConfig::default(),
        Arc::new(ScriptedDiagnoser::always(diagnosis_for(&wrong_change(), 0.9))),
        Arc::new(ScriptedFixProposer::always(proposal_for(&wrong_change(), 0.9))),
        Arc::new(CrashingRunner::default()),
    );

    let err = correction
        .run("task-11", &broken_artifact(), &initial_failure())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CorrectionError::Collaborator {
            stage: LoopState::Verifying,
            ..
        }
    ));
    assert_eq!(err.attempts().len(), 1);
    assert!(err.attempts()[0].is_failure());
    assert!(err.last_confidence().unwrap().overall > 0.5);
}

// ---- Invalid proposals ----

fn trivial_proposal() -> forgegate_core::FixProposal {
    proposal_for(&CodeChange::new("calc.py", "return a - b", "return a - b"), 0.9)
}

#[tokio::test]
async fn invalid_proposal_is_retried_once() {
    let proposer = Arc::new(ScriptedFixProposer::new(vec![
        trivial_proposal(),
        proposal_for(&good_change(), 0.9),
    ]));
    let correction = CorrectionLoop::new(
        CorrectionConfig::default(),
        Arc::new(ScriptedDiagnoser::always(diagnosis_for(&good_change(), 0.9))),
        proposer.clone(),
        tests(),
    );

    let outcome = correction
        .run("task-12", &broken_artifact(), &initial_failure())
        .await
        .unwrap();

    assert_eq!(outcome.status, LoopStatus::Succeeded);
    assert_eq!(outcome.iterations_used, 1);
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(proposer.call_count(), 2);
}

#[tokio::test]
async fn invalid_proposal_twice_is_an_invariant_violation() {
    let proposer = Arc::new(ScriptedFixProposer::always(trivial_proposal()));
    let applier = Arc::new(CountingApplier::new());
    let correction = CorrectionLoop::new(
        CorrectionConfig::default(),
        Arc::new(ScriptedDiagnoser::always(diagnosis_for(&good_change(), 0.9))),
        proposer.clone(),
        tests(),
    )
    .with_applier(applier.clone());

    let err = correction
        .run("task-13", &broken_artifact(), &initial_failure())
        .await
        .unwrap_err();

    match &err {
        CorrectionError::InvariantViolation {
            stage, attempts, ..
        } => {
            assert_eq!(*stage, LoopState::Proposing);
            assert_eq!(attempts.len(), 1);
            assert!(attempts[0]
                .failure_reason
                .as_deref()
                .unwrap()
                .starts_with("invalid fix proposal"));
        }
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
    assert_eq!(proposer.call_count(), 2);
    assert_eq!(applier.apply_count(), 0);
}
