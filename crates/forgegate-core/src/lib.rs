//! forgegate core library
//!
//! Review aggregation, severity gates, confidence scoring and the human
//! approval contract shared by the forgegate pipeline.

pub mod approval;
pub mod confidence;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod quality_gate;
pub mod reporting;
pub mod review;
pub mod telemetry;

pub use approval::{
    ApprovalDecision, ApprovalGateway, ApprovalRequest, ApprovalResponse, CallbackGateway, GateType,
    HitlOverrideRecord, LegacyApprovalCallback,
};

pub use confidence::{
    ConfidenceBreakdown, ConfidenceEngine, HIGH_CONFIDENCE_THRESHOLD, LOW_CONFIDENCE_THRESHOLD,
};

pub use domain::{
    AggregatedReport, ArtifactKind, AutomatedCheck, CandidateFix, Category, CodeChange,
    ContentDigest, CorrectionAttempt, DiagnosticReport, DroppedItem, Finding, FixProposal,
    ForgeError, Location, Phase, Priority, Result, Severity, SeverityCounts, Suggestion,
    TestResult, Verdict, WorkArtifact,
};

pub use quality_gate::{gate_block_reason, GateFlavor, QualityGate};

pub use reporting::render_report_md;

pub use review::{
    dispatch_reviewers, AggregatorConfig, RawFinding, RawSuggestion, ReviewAggregator,
    ReviewResults, Reviewer, ReviewerOutput,
};

pub use metrics::METRICS;

/// Crate version for embedding in reports and logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
