//! Wire shapes of specialist output before normalization.
//!
//! Every field is optional: reviewers are free-form producers and the
//! aggregator repairs what it can.

use serde::{Deserialize, Serialize};

use crate::domain::{AggregatedReport, Finding, Result, Suggestion};

/// A finding as a reviewer reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFinding {
    pub id: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
    pub evidence: Option<String>,
    pub impact: Option<String>,
    #[serde(alias = "file")]
    pub file_path: Option<String>,
    #[serde(alias = "line")]
    pub line_number: Option<u32>,
    /// Free-form `path:line` location, used when `file_path` is absent.
    pub location: Option<String>,
    /// Attributed reviewer; overrides the dispatch name when re-aggregating.
    pub reviewer: Option<String>,
}

/// A suggestion as a reviewer reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSuggestion {
    pub id: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "notes")]
    pub implementation_notes: Option<String>,
    #[serde(alias = "finding_id")]
    pub related_finding_id: Option<String>,
    pub reviewer: Option<String>,
}

/// Everything one reviewer returned for one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerOutput {
    pub findings: Vec<RawFinding>,
    pub suggestions: Vec<RawSuggestion>,
}

impl ReviewerOutput {
    /// The substitute result for a reviewer that errored.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty() && self.suggestions.is_empty()
    }

    /// Parse a `{findings: [...], suggestions: [...]}` JSON value. Missing
    /// arrays are treated as empty.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Re-express an aggregated report as raw reviewer output, e.g. to
    /// re-aggregate it.
    pub fn from_report(report: &AggregatedReport) -> Self {
        Self {
            findings: report.findings.iter().map(RawFinding::from).collect(),
            suggestions: report.suggestions.iter().map(RawSuggestion::from).collect(),
        }
    }
}

impl From<&Finding> for RawFinding {
    fn from(f: &Finding) -> Self {
        Self {
            id: Some(f.id.clone()),
            title: None,
            category: Some(f.category.to_string()),
            severity: Some(f.severity.to_string()),
            description: Some(f.description.clone()),
            evidence: Some(f.evidence.clone()),
            impact: Some(f.impact.clone()),
            file_path: f.location.file_path.clone(),
            line_number: f.location.line_number,
            location: None,
            reviewer: Some(f.reviewer.clone()),
        }
    }
}

impl From<&Suggestion> for RawSuggestion {
    fn from(s: &Suggestion) -> Self {
        Self {
            id: Some(s.id.clone()),
            title: None,
            category: Some(s.category.to_string()),
            priority: Some(s.priority.to_string()),
            description: Some(s.description.clone()),
            implementation_notes: Some(s.implementation_notes.clone()),
            related_finding_id: s.related_finding_id.clone(),
            reviewer: Some(s.reviewer.clone()),
        }
    }
}
