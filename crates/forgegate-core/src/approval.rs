//! Human-in-the-loop approval contract.
//!
//! The pipeline asks an [`ApprovalGateway`] whenever a quality gate blocks or
//! the correction loop escalates. Calls may take as long as a human needs;
//! no timeout is applied here, callers own any timeout policy.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceBreakdown;
use crate::domain::{AggregatedReport, Result};

/// Reviewer name recorded for decisions made through a legacy callback.
pub const LEGACY_CALLBACK_REVIEWER: &str = "legacy-callback";

/// What kind of checkpoint is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateType {
    /// A phase quality gate returned a non-pass verdict.
    QualityGate,
    /// The correction loop wants permission to keep iterating.
    CorrectionEscalation,
}

/// A request for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub task_id: String,
    pub gate_type: GateType,
    pub gate_name: String,
    /// Full report for quality-gate requests.
    pub quality_report: Option<AggregatedReport>,
    /// Last confidence breakdown for escalation requests.
    pub confidence: Option<ConfidenceBreakdown>,
    pub reason: String,
}

impl ApprovalRequest {
    pub fn quality_gate(
        task_id: impl Into<String>,
        gate_name: impl Into<String>,
        report: AggregatedReport,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            gate_type: GateType::QualityGate,
            gate_name: gate_name.into(),
            quality_report: Some(report),
            confidence: None,
            reason: reason.into(),
        }
    }

    pub fn escalation(
        task_id: impl Into<String>,
        gate_name: impl Into<String>,
        confidence: Option<ConfidenceBreakdown>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            gate_type: GateType::CorrectionEscalation,
            gate_name: gate_name.into(),
            quality_report: None,
            confidence,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl ApprovalDecision {
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// A human decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub decision: ApprovalDecision,
    pub reviewer: String,
    pub timestamp: DateTime<Utc>,
    pub justification: String,
}

impl ApprovalResponse {
    pub fn approved(reviewer: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            decision: ApprovalDecision::Approved,
            reviewer: reviewer.into(),
            timestamp: Utc::now(),
            justification: justification.into(),
        }
    }

    pub fn rejected(reviewer: impl Into<String>, justification: impl Into<String>) -> Self {
        Self {
            decision: ApprovalDecision::Rejected,
            reviewer: reviewer.into(),
            timestamp: Utc::now(),
            justification: justification.into(),
        }
    }
}

/// Append-only audit entry for a human override of a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitlOverrideRecord {
    pub gate_name: String,
    pub decision: ApprovalDecision,
    pub reviewer: String,
    pub timestamp: DateTime<Utc>,
    pub justification: String,
}

impl HitlOverrideRecord {
    pub fn from_response(gate_name: impl Into<String>, response: &ApprovalResponse) -> Self {
        Self {
            gate_name: gate_name.into(),
            decision: response.decision,
            reviewer: response.reviewer.clone(),
            timestamp: response.timestamp,
            justification: response.justification.clone(),
        }
    }
}

/// Source of human decisions.
#[async_trait]
pub trait ApprovalGateway: Send + Sync {
    async fn request_approval(&self, request: ApprovalRequest) -> Result<ApprovalResponse>;
}

/// The simple `(gate_name, report) -> approved` hook older hosts supply.
pub type LegacyApprovalCallback = Arc<dyn Fn(&str, &AggregatedReport) -> bool + Send + Sync>;

/// Adapts a [`LegacyApprovalCallback`] to [`ApprovalGateway`].
///
/// Requests without a report (correction escalations) are rejected, since
/// the callback has nothing to judge.
#[derive(Clone)]
pub struct CallbackGateway {
    callback: LegacyApprovalCallback,
}

impl CallbackGateway {
    pub fn new(callback: LegacyApprovalCallback) -> Self {
        Self { callback }
    }
}

impl std::fmt::Debug for CallbackGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackGateway").finish_non_exhaustive()
    }
}

#[async_trait]
impl ApprovalGateway for CallbackGateway {
    async fn request_approval(&self, request: ApprovalRequest) -> Result<ApprovalResponse> {
        let Some(report) = request.quality_report.as_ref() else {
            return Ok(ApprovalResponse::rejected(
                LEGACY_CALLBACK_REVIEWER,
                "legacy callback cannot judge requests without a quality report",
            ));
        };

        if (self.callback)(&request.gate_name, report) {
            Ok(ApprovalResponse::approved(
                LEGACY_CALLBACK_REVIEWER,
                format!("approved by legacy callback for gate '{}'", request.gate_name),
            ))
        } else {
            Ok(ApprovalResponse::rejected(
                LEGACY_CALLBACK_REVIEWER,
                format!("rejected by legacy callback for gate '{}'", request.gate_name),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SeverityCounts, Verdict};

    fn report() -> AggregatedReport {
        AggregatedReport {
            findings: vec![],
            suggestions: vec![],
            severity_counts: SeverityCounts::default(),
            verdict: Verdict::NeedsImprovement,
            automated_checks: vec![],
            duration_ms: 0,
            reviewers: vec![],
            failed_reviewers: vec![],
            dropped: vec![],
            repairs_applied: 0,
            artifact_digest: None,
        }
    }

    #[tokio::test]
    async fn test_callback_gateway_maps_bool() {
        let gateway = CallbackGateway::new(Arc::new(|gate: &str, _: &AggregatedReport| gate == "design"));

        let yes = gateway
            .request_approval(ApprovalRequest::quality_gate("t1", "design", report(), "medium findings"))
            .await
            .unwrap();
        assert!(yes.decision.is_approved());
        assert_eq!(yes.reviewer, LEGACY_CALLBACK_REVIEWER);

        let no = gateway
            .request_approval(ApprovalRequest::quality_gate("t1", "code", report(), "medium findings"))
            .await
            .unwrap();
        assert_eq!(no.decision, ApprovalDecision::Rejected);
        assert!(no.justification.contains("code"));
    }

    #[tokio::test]
    async fn test_callback_gateway_rejects_escalations() {
        let gateway = CallbackGateway::new(Arc::new(|_: &str, _: &AggregatedReport| true));
        let response = gateway
            .request_approval(ApprovalRequest::escalation("t1", "correction", None, "low confidence"))
            .await
            .unwrap();
        assert!(!response.decision.is_approved());
    }

    #[test]
    fn test_override_record_copies_response() {
        let response = ApprovalResponse::approved("alice", "accepted risk");
        let record = HitlOverrideRecord::from_response("design_gate", &response);
        assert_eq!(record.gate_name, "design_gate");
        assert_eq!(record.reviewer, "alice");
        assert_eq!(record.timestamp, response.timestamp);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"approved\""));
    }
}
