//! In-memory fakes for the reviewer and approval traits (testing only)
//!
//! Provides `StaticReviewer`, `FailingReviewer`, `PanickingReviewer` and
//! `StaticApprover` that satisfy the trait contracts without any model or
//! human behind them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::approval::{ApprovalDecision, ApprovalGateway, ApprovalRequest, ApprovalResponse};
use crate::domain::{ForgeError, Result, WorkArtifact};
use crate::review::{RawFinding, Reviewer, ReviewerOutput};

// ---------------------------------------------------------------------------
// Reviewers
// ---------------------------------------------------------------------------

/// Returns the same output for every artifact and counts calls.
#[derive(Debug)]
pub struct StaticReviewer {
    name: String,
    output: ReviewerOutput,
    calls: AtomicUsize,
}

impl StaticReviewer {
    pub fn new(name: impl Into<String>, output: ReviewerOutput) -> Self {
        Self {
            name: name.into(),
            output,
            calls: AtomicUsize::new(0),
        }
    }

    /// A reviewer that never finds anything.
    pub fn clean(name: impl Into<String>) -> Self {
        Self::new(name, ReviewerOutput::empty())
    }

    /// A reviewer with one finding of `severity` at `file:line`.
    pub fn with_finding(name: impl Into<String>, severity: &str, file: &str, line: u32) -> Self {
        let name = name.into();
        let finding = RawFinding {
            id: Some(format!("{name}-{file}-{line}")),
            category: Some(name.clone()),
            severity: Some(severity.to_string()),
            description: Some(format!("{severity} issue found by {name} in {file}")),
            file_path: Some(file.to_string()),
            line_number: Some(line),
            ..Default::default()
        };
        Self::new(
            name,
            ReviewerOutput {
                findings: vec![finding],
                suggestions: vec![],
            },
        )
    }

    pub fn from_json(name: impl Into<String>, value: serde_json::Value) -> Result<Self> {
        Ok(Self::new(name, ReviewerOutput::from_json(value)?))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reviewer for StaticReviewer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, _artifact: &WorkArtifact) -> Result<ReviewerOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Always returns a collaborator error.
#[derive(Debug)]
pub struct FailingReviewer {
    name: String,
    message: String,
}

impl FailingReviewer {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Reviewer for FailingReviewer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, _artifact: &WorkArtifact) -> Result<ReviewerOutput> {
        Err(ForgeError::collaborator(&self.name, &self.message))
    }
}

/// Panics inside its task.
#[derive(Debug)]
pub struct PanickingReviewer {
    name: String,
}

impl PanickingReviewer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Reviewer for PanickingReviewer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(&self, _artifact: &WorkArtifact) -> Result<ReviewerOutput> {
        panic!("reviewer {} exploded", self.name);
    }
}

// ---------------------------------------------------------------------------
// StaticApprover
// ---------------------------------------------------------------------------

/// Answers every request with the same decision and records the requests.
#[derive(Debug)]
pub struct StaticApprover {
    decision: ApprovalDecision,
    reviewer: String,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl StaticApprover {
    pub fn approving(reviewer: impl Into<String>) -> Self {
        Self::new(ApprovalDecision::Approved, reviewer)
    }

    pub fn rejecting(reviewer: impl Into<String>) -> Self {
        Self::new(ApprovalDecision::Rejected, reviewer)
    }

    fn new(decision: ApprovalDecision, reviewer: impl Into<String>) -> Self {
        Self {
            decision,
            reviewer: reviewer.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ApprovalGateway for StaticApprover {
    async fn request_approval(&self, request: ApprovalRequest) -> Result<ApprovalResponse> {
        let justification = format!("{} for gate '{}'", self.decision_word(), request.gate_name);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Ok(match self.decision {
            ApprovalDecision::Approved => ApprovalResponse::approved(&self.reviewer, justification),
            ApprovalDecision::Rejected => ApprovalResponse::rejected(&self.reviewer, justification),
        })
    }
}

impl StaticApprover {
    fn decision_word(&self) -> &'static str {
        match self.decision {
            ApprovalDecision::Approved => "approved",
            ApprovalDecision::Rejected => "rejected",
        }
    }
}
