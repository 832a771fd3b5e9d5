//! Normalized specialist output: findings and suggestions.

use serde::{Deserialize, Serialize};

/// Finding severity. Ordering follows Critical > High > Medium > Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical review categories. `General` is the fallback for anything the
/// synonym table does not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Security,
    Performance,
    Correctness,
    Reliability,
    Maintainability,
    Testing,
    Documentation,
    Architecture,
    Style,
    General,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Correctness => "correctness",
            Category::Reliability => "reliability",
            Category::Maintainability => "maintainability",
            Category::Testing => "testing",
            Category::Documentation => "documentation",
            Category::Architecture => "architecture",
            Category::Style => "style",
            Category::General => "general",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggestion priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        f.write_str(s)
    }
}

/// Where a finding points in the artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
}

impl Location {
    pub fn at(file_path: impl Into<String>, line_number: u32) -> Self {
        Self {
            file_path: Some(file_path.into()),
            line_number: Some(line_number),
        }
    }

    pub fn file(file_path: impl Into<String>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            line_number: None,
        }
    }

    /// `true` when neither file nor line is known.
    pub fn is_unknown(&self) -> bool {
        self.file_path.is_none() && self.line_number.is_none()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file_path, self.line_number) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}"),
            (Some(file), None) => write!(f, "{file}"),
            (None, Some(line)) => write!(f, "line {line}"),
            (None, None) => write!(f, "unknown location"),
        }
    }
}

/// A single reviewed issue, owned by an `AggregatedReport` after merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub category: Category,
    pub severity: Severity,
    pub description: String,
    pub evidence: String,
    pub impact: String,
    pub location: Location,
    /// Name of the specialist that reported it.
    pub reviewer: String,
}

/// An improvement proposal, optionally tied to a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub category: Category,
    pub priority: Priority,
    pub description: String,
    pub implementation_notes: String,
    pub related_finding_id: Option<String>,
    pub reviewer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordinal() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(
            [Severity::Medium, Severity::Critical, Severity::Low]
                .into_iter()
                .max(),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn test_location_display() {
        assert_eq!(Location::at("file.py", 10).to_string(), "file.py:10");
        assert_eq!(Location::file("file.py").to_string(), "file.py");
        assert!(Location::default().is_unknown());
    }

    #[test]
    fn test_category_serde_snake_case() {
        let json = serde_json::to_string(&Category::Maintainability).unwrap();
        assert_eq!(json, "\"maintainability\"");
    }
}
