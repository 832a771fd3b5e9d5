//! Phase orchestration with quality gates, correction and HITL overrides.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use forgegate_core::obs::{
    emit_gate_evaluated, emit_override_recorded, emit_phase_started, emit_pipeline_finished,
    emit_review_aggregated, pipeline_span,
};
use forgegate_core::{
    dispatch_reviewers, gate_block_reason, AggregatedReport, AggregatorConfig, ApprovalGateway,
    ApprovalRequest, CallbackGateway, HitlOverrideRecord, LegacyApprovalCallback, Phase,
    QualityGate, Result, ReviewAggregator, Reviewer, Verdict, WorkArtifact, METRICS,
};

use crate::config::PipelineConfig;
use crate::correction::{
    ChangeApplier, CorrectionConfig, CorrectionLoop, CorrectionOutcome, Diagnoser, FixProposer,
    InMemoryApplier, LoopState, LoopStatus, TestRunner,
};
use crate::error::{CorrectionError, PipelineError, PipelineResult};

/// Produces the artifact for a phase, given the previous phase's artifact.
#[async_trait]
pub trait ArtifactProducer: Send + Sync {
    async fn produce(&self, phase: Phase, previous: Option<&WorkArtifact>) -> Result<WorkArtifact>;
}

/// One phase to run: its gate and the reviewers that judge its artifact.
#[derive(Clone)]
pub struct PhasePlan {
    pub phase: Phase,
    pub gate: QualityGate,
    pub reviewers: Vec<Arc<dyn Reviewer>>,
}

impl PhasePlan {
    pub fn new(phase: Phase, gate: QualityGate) -> Self {
        Self {
            phase,
            gate,
            reviewers: Vec::new(),
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.reviewers.push(reviewer);
        self
    }

    pub fn with_reviewers(mut self, reviewers: impl IntoIterator<Item = Arc<dyn Reviewer>>) -> Self {
        self.reviewers.extend(reviewers);
        self
    }
}

impl std::fmt::Debug for PhasePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhasePlan")
            .field("phase", &self.phase)
            .field("gate", &self.gate)
            .field(
                "reviewers",
                &self.reviewers.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Collaborators needed to repair a failing phase artifact.
#[derive(Clone)]
pub struct CorrectionToolkit {
    pub diagnoser: Arc<dyn Diagnoser>,
    pub proposer: Arc<dyn FixProposer>,
    pub tests: Arc<dyn TestRunner>,
    pub applier: Arc<dyn ChangeApplier>,
}

impl CorrectionToolkit {
    pub fn new(
        diagnoser: Arc<dyn Diagnoser>,
        proposer: Arc<dyn FixProposer>,
        tests: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            diagnoser,
            proposer,
            tests,
            applier: Arc::new(InMemoryApplier),
        }
    }

    pub fn with_applier(mut self, applier: Arc<dyn ChangeApplier>) -> Self {
        self.applier = applier;
        self
    }
}

// ---------------------------------------------------------------------------
// Execution log & result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Started,
    Reviewed,
    CorrectionStarted,
    Corrected,
    CorrectionExhausted,
    OverrideGranted,
    Passed,
    Failed,
}

/// One phase transition. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// How one phase ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub gate_name: String,
    /// Verdict of the last review of this phase.
    pub verdict: Verdict,
    pub report: AggregatedReport,
    pub correction: Option<CorrectionOutcome>,
    /// Progressed only because a human approved an override.
    pub overridden: bool,
    pub artifact: WorkArtifact,
}

/// Result of a pipeline run. Complete on success, partial when attached to an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: String,
    pub task_id: String,
    pub phases: Vec<PhaseOutcome>,
    pub overrides: Vec<HitlOverrideRecord>,
    pub log: Vec<ExecutionLogEntry>,
    pub final_artifact: Option<WorkArtifact>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Wall-clock span from the first to the last log entry.
    pub fn total_duration(&self) -> chrono::Duration {
        match (self.log.first(), self.log.last()) {
            (Some(first), Some(last)) => last.recorded_at - first.recorded_at,
            _ => chrono::Duration::zero(),
        }
    }

    /// Every gate passed on its own merits.
    pub fn passed_without_overrides(&self) -> bool {
        self.overrides.is_empty()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn statuses(&self, phase: Phase) -> Vec<PhaseStatus> {
        self.log
            .iter()
            .filter(|e| e.phase == phase)
            .map(|e| e.status)
            .collect()
    }
}

#[derive(Default)]
struct ExecutionLog(Vec<ExecutionLogEntry>);

impl ExecutionLog {
    fn record(&mut self, phase: Phase, status: PhaseStatus, detail: Option<String>) {
        info!(phase = %phase, status = ?status, detail = detail.as_deref().unwrap_or(""), "phase transition");
        self.0.push(ExecutionLogEntry {
            phase,
            status,
            detail,
            recorded_at: Utc::now(),
        });
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

pub struct PipelineOrchestrator {
    producer: Arc<dyn ArtifactProducer>,
    phases: Vec<PhasePlan>,
    aggregator_config: AggregatorConfig,
    correction_config: CorrectionConfig,
    toolkit: Option<CorrectionToolkit>,
    gateway: Option<Arc<dyn ApprovalGateway>>,
    callback: Option<LegacyApprovalCallback>,
}

impl PipelineOrchestrator {
    pub fn new(producer: Arc<dyn ArtifactProducer>) -> Self {
        Self {
            producer,
            phases: Vec::new(),
            aggregator_config: AggregatorConfig::default(),
            correction_config: CorrectionConfig::default(),
            toolkit: None,
            gateway: None,
            callback: None,
        }
    }

    /// Phases, gates, aggregation and correction settings from `config`;
    /// reviewers come from `reviewers_for`.
    pub fn from_config<F>(
        producer: Arc<dyn ArtifactProducer>,
        config: &PipelineConfig,
        reviewers_for: F,
    ) -> Self
    where
        F: FnMut(Phase) -> Vec<Arc<dyn Reviewer>>,
    {
        let mut orchestrator = Self::new(producer)
            .with_phases(config.phase_plans(reviewers_for))
            .with_aggregator_config(config.aggregator.clone());
        orchestrator.correction_config = config.correction.clone();
        orchestrator
    }

    pub fn with_phase(mut self, plan: PhasePlan) -> Self {
        self.phases.push(plan);
        self
    }

    pub fn with_phases(mut self, plans: impl IntoIterator<Item = PhasePlan>) -> Self {
        self.phases.extend(plans);
        self
    }

    pub fn with_aggregator_config(mut self, config: AggregatorConfig) -> Self {
        self.aggregator_config = config;
        self
    }

    /// Enable the correction loop for failing phases.
    pub fn with_correction(mut self, config: CorrectionConfig, toolkit: CorrectionToolkit) -> Self {
        self.correction_config = config;
        self.toolkit = Some(toolkit);
        self
    }

    /// Enable correction with the already configured loop settings.
    pub fn with_correction_toolkit(mut self, toolkit: CorrectionToolkit) -> Self {
        self.toolkit = Some(toolkit);
        self
    }

    pub fn with_approval_gateway(mut self, gateway: Arc<dyn ApprovalGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Legacy `(gate_name, report) -> bool` hook. Ignored when a gateway is
    /// configured.
    pub fn with_approval_callback(mut self, callback: LegacyApprovalCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn phases(&self) -> &[PhasePlan] {
        &self.phases
    }

    /// Gateway for gate overrides: the configured gateway, else the legacy
    /// callback.
    fn override_approver(&self) -> Option<Arc<dyn ApprovalGateway>> {
        if let Some(gateway) = &self.gateway {
            return Some(Arc::clone(gateway));
        }
        self.callback
            .as_ref()
            .map(|cb| Arc::new(CallbackGateway::new(Arc::clone(cb))) as Arc<dyn ApprovalGateway>)
    }

    /// Run every phase in order.
    ///
    /// Returns an error for a blocked gate nobody could override, a rejected
    /// override, or a correction loop that ended in an error. Those errors
    /// carry the partial result; see [`PipelineError::partial`].
    pub async fn run(&self, task_id: &str) -> PipelineResult<ExecutionResult> {
        let run_id = Uuid::new_v4().to_string();
        let span = pipeline_span(&run_id, task_id);
        self.run_phases(run_id, task_id).instrument(span).await
    }

    async fn run_phases(&self, run_id: String, task_id: &str) -> PipelineResult<ExecutionResult> {
        let start = Instant::now();
        info!(run_id = %run_id, task_id = %task_id, phases = self.phases.len(), "pipeline started");

        let mut log = ExecutionLog::default();
        let mut outcomes: Vec<PhaseOutcome> = Vec::with_capacity(self.phases.len());
        let mut overrides: Vec<HitlOverrideRecord> = Vec::new();
        let mut previous: Option<WorkArtifact> = None;

        for plan in &self.phases {
            let result = self
                .run_phase(task_id, &run_id, plan, previous.as_ref(), &mut log, &mut overrides)
                .await;
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    log.record(plan.phase, PhaseStatus::Failed, Some(e.to_string()));
                    let duration_ms = start.elapsed().as_millis() as u64;
                    emit_pipeline_finished(&run_id, duration_ms, outcomes.len(), false);
                    METRICS.flush();
                    // Completed phases, granted overrides and the log up to the failure.
                    return Err(e.with_partial(ExecutionResult {
                        run_id,
                        task_id: task_id.to_string(),
                        phases: outcomes,
                        overrides,
                        log: log.0,
                        final_artifact: previous,
                        duration_ms,
                    }));
                }
            };
            previous = Some(outcome.artifact.clone());
            outcomes.push(outcome);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        emit_pipeline_finished(&run_id, duration_ms, outcomes.len(), true);
        METRICS.flush();

        Ok(ExecutionResult {
            run_id,
            task_id: task_id.to_string(),
            phases: outcomes,
            overrides,
            log: log.0,
            final_artifact: previous,
            duration_ms,
        })
    }

    async fn review(
        &self,
        plan: &PhasePlan,
        aggregator: &ReviewAggregator,
        artifact: &WorkArtifact,
    ) -> AggregatedReport {
        let results = dispatch_reviewers(&plan.reviewers, artifact).await;
        let report = aggregator.aggregate(artifact, &results);
        emit_review_aggregated(
            &plan.phase.to_string(),
            report.findings.len(),
            report.suggestions.len(),
            report.failed_reviewers.len(),
        );
        emit_gate_evaluated(&plan.gate.name, report.verdict, &report.severity_counts);
        report
    }

    async fn run_phase(
        &self,
        task_id: &str,
        run_id: &str,
        plan: &PhasePlan,
        previous: Option<&WorkArtifact>,
        log: &mut ExecutionLog,
        overrides: &mut Vec<HitlOverrideRecord>,
    ) -> PipelineResult<PhaseOutcome> {
        let phase = plan.phase;
        log.record(phase, PhaseStatus::Started, None);
        emit_phase_started(run_id, &phase.to_string());

        let mut artifact = self
            .producer
            .produce(phase, previous)
            .await
            .map_err(|source| PipelineError::Artifact { phase, source })?;

        let aggregator =
            ReviewAggregator::new(self.aggregator_config.clone()).with_gate(plan.gate.clone());
        let mut report = self.review(plan, &aggregator, &artifact).await;
        log.record(phase, PhaseStatus::Reviewed, Some(report.verdict.to_string()));

        let mut correction = None;
        if !report.verdict.is_pass() {
            if let Some(toolkit) = &self.toolkit {
                if let Some(outcome) = self.correct(task_id, phase, toolkit, &artifact, log).await? {
                    if outcome.status == LoopStatus::Succeeded {
                        artifact = outcome.final_artifact.clone();
                        report = self.review(plan, &aggregator, &artifact).await;
                        log.record(phase, PhaseStatus::Corrected, Some(report.verdict.to_string()));
                    }
                    correction = Some(outcome);
                }
            }
        }

        let mut overridden = false;
        if plan.gate.requires_override(report.verdict) {
            let record = self.request_override(task_id, plan, &report).await?;
            log.record(
                phase,
                PhaseStatus::OverrideGranted,
                Some(format!("{} by {}", record.gate_name, record.reviewer)),
            );
            overrides.push(record);
            overridden = true;
        }

        log.record(phase, PhaseStatus::Passed, None);
        Ok(PhaseOutcome {
            phase,
            gate_name: plan.gate.name.clone(),
            verdict: report.verdict,
            report,
            correction,
            overridden,
            artifact,
        })
    }

    /// Run the correction loop when the artifact's own tests fail. `None`
    /// means the tests already pass and there is nothing to correct.
    async fn correct(
        &self,
        task_id: &str,
        phase: Phase,
        toolkit: &CorrectionToolkit,
        artifact: &WorkArtifact,
        log: &mut ExecutionLog,
    ) -> PipelineResult<Option<CorrectionOutcome>> {
        let evidence = toolkit.tests.run_tests(artifact).await.map_err(|source| {
            PipelineError::Correction {
                phase,
                source: CorrectionError::Collaborator {
                    stage: LoopState::Verifying,
                    source,
                    attempts: Vec::new(),
                    confidence: None,
                },
                partial: None,
            }
        })?;
        if evidence.all_passed() {
            info!(phase = %phase, "tests pass; gate failure left to override");
            return Ok(None);
        }

        log.record(
            phase,
            PhaseStatus::CorrectionStarted,
            Some(format!("{} of {} tests failing", evidence.failed, evidence.total)),
        );

        let mut correction_loop = CorrectionLoop::new(
            self.correction_config.clone(),
            Arc::clone(&toolkit.diagnoser),
            Arc::clone(&toolkit.proposer),
            Arc::clone(&toolkit.tests),
        )
        .with_applier(Arc::clone(&toolkit.applier));
        if let Some(gateway) = &self.gateway {
            correction_loop = correction_loop.with_approver(Arc::clone(gateway));
        }

        let outcome = correction_loop
            .run(task_id, artifact, &evidence)
            .await
            .map_err(|source| PipelineError::Correction {
                phase,
                source,
                partial: None,
            })?;

        if outcome.status == LoopStatus::Exhausted {
            warn!(phase = %phase, iterations = outcome.iterations_used, "correction exhausted");
            log.record(
                phase,
                PhaseStatus::CorrectionExhausted,
                Some(format!("{} iteration(s)", outcome.iterations_used)),
            );
        }
        Ok(Some(outcome))
    }

    /// Ask for a human override of a blocked gate.
    async fn request_override(
        &self,
        task_id: &str,
        plan: &PhasePlan,
        report: &AggregatedReport,
    ) -> PipelineResult<HitlOverrideRecord> {
        let gate = &plan.gate.name;
        let block_reason = gate_block_reason(report.verdict, &report.severity_counts)
            .unwrap_or_else(|| format!("verdict {}", report.verdict));

        let Some(approver) = self.override_approver() else {
            warn!(gate = %gate, reason = %block_reason, "gate blocked and no approver configured");
            return Err(PipelineError::QualityGateFailure {
                gate: gate.clone(),
                verdict: report.verdict,
                reason: format!("no approver available ({block_reason})"),
                report: Box::new(report.clone()),
                partial: None,
            });
        };

        let request = ApprovalRequest::quality_gate(task_id, gate.as_str(), report.clone(), block_reason);
        let response = approver
            .request_approval(request)
            .await
            .map_err(|source| PipelineError::Approval {
                gate: gate.clone(),
                source,
            })?;

        let approved = response.decision.is_approved();
        emit_override_recorded(gate, &response.reviewer, approved);
        if !approved {
            return Err(PipelineError::RejectedOverride {
                gate: gate.clone(),
                reviewer: response.reviewer,
                justification: response.justification,
                report: Box::new(report.clone()),
                partial: None,
            });
        }

        METRICS.inc_overrides_granted();
        Ok(HitlOverrideRecord::from_response(gate.as_str(), &response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::StaticProducer;
    use forgegate_core::fakes::StaticReviewer;

    #[tokio::test]
    async fn test_log_brackets_each_phase() {
        let orchestrator = PipelineOrchestrator::new(Arc::new(StaticProducer::new())).with_phases(
            [Phase::Plan, Phase::Design].map(|p| {
                PhasePlan::new(p, QualityGate::pipeline_wide(format!("{p}_gate")))
                    .with_reviewer(Arc::new(StaticReviewer::clean("style")))
            }),
        );

        let result = orchestrator.run("task-1").await.unwrap();

        assert_eq!(
            result.statuses(Phase::Plan),
            vec![PhaseStatus::Started, PhaseStatus::Reviewed, PhaseStatus::Passed]
        );
        assert_eq!(result.log.len(), 6);
        assert!(result.total_duration() >= chrono::Duration::zero());
        assert_eq!(
            result.final_artifact.as_ref().map(|a| a.files.contains_key("design.md")),
            Some(true)
        );
    }

    #[test]
    fn test_callback_alone_provides_override_approver() {
        let bare = PipelineOrchestrator::new(Arc::new(StaticProducer::new()));
        assert!(bare.override_approver().is_none());

        let orchestrator = bare.with_approval_callback(Arc::new(|_: &str, _: &AggregatedReport| true));
        assert!(orchestrator.gateway.is_none());
        assert!(orchestrator.override_approver().is_some());
    }
}
