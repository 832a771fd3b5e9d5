//! Repair-or-drop normalization of raw reviewer items.
//!
//! Normalization never fails the aggregation as a whole. Each raw item is
//! either repaired into a canonical [`Finding`] / [`Suggestion`] (with the
//! applied repairs listed) or reported as a [`NormalizationIssue`] and
//! dropped.

use tracing::warn;

use super::category::canonical_category;
use super::raw::{RawFinding, RawSuggestion};
use crate::domain::{Category, DroppedItem, Finding, Location, Priority, Severity, Suggestion};

/// Minimum length of description-like text after normalization.
pub const MIN_TEXT_LEN: usize = 20;

/// Placeholder used when a suggestion carries no implementation notes.
pub const DEFAULT_IMPLEMENTATION_NOTES: &str = "No implementation notes provided by the reviewer.";

/// One fix applied to a raw item during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// Category was missing or unrecognized; fell back to `General`.
    CategoryFallback { raw: Option<String> },
    SeverityDefaulted { raw: Option<String> },
    PriorityDefaulted { raw: Option<String> },
    /// Description was missing; the title was used instead.
    DescriptionRecovered,
    DescriptionPadded,
    EvidenceSynthesized,
    EvidencePadded,
    ImpactSynthesized,
    ImpactPadded,
    IdSynthesized,
    /// Location came from the free-form `location` field.
    LocationParsed,
    NotesDefaulted,
}

/// A normalized value together with the repairs that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<T> {
    pub value: T,
    pub repairs: Vec<Repair>,
}

/// A raw item that could not be repaired.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{item_kind} #{index} from '{reviewer}' dropped: {reason}")]
pub struct NormalizationIssue {
    pub reviewer: String,
    pub item_kind: &'static str,
    pub index: usize,
    pub reason: String,
}

impl From<NormalizationIssue> for DroppedItem {
    fn from(issue: NormalizationIssue) -> Self {
        DroppedItem {
            reviewer: issue.reviewer,
            item_kind: issue.item_kind.to_string(),
            index: issue.index,
            reason: issue.reason,
        }
    }
}

/// Parse a free-form severity. Accepts common tool vocabularies.
pub fn parse_severity(raw: &str) -> Option<Severity> {
    match raw.trim().to_lowercase().as_str() {
        "critical" | "blocker" | "severe" | "fatal" => Some(Severity::Critical),
        "high" | "major" | "error" => Some(Severity::High),
        "medium" | "moderate" | "warning" | "warn" => Some(Severity::Medium),
        "low" | "minor" | "info" | "trivial" | "nit" => Some(Severity::Low),
        _ => None,
    }
}

/// Parse a free-form suggestion priority.
pub fn parse_priority(raw: &str) -> Option<Priority> {
    match raw.trim().to_lowercase().as_str() {
        "critical" | "high" | "urgent" | "p0" | "p1" => Some(Priority::High),
        "medium" | "normal" | "p2" => Some(Priority::Medium),
        "low" | "optional" | "nice-to-have" | "nice to have" | "p3" => Some(Priority::Low),
        _ => None,
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Append `context` when `text` is shorter than `min_len`, then pad with
/// dots if it is still short. Returns `None` when no padding was needed.
fn pad_text(text: &str, context: &str, min_len: usize) -> Option<String> {
    if text.chars().count() >= min_len {
        return None;
    }
    let mut padded = format!("{text} ({context})");
    while padded.chars().count() < min_len {
        padded.push('.');
    }
    Some(padded)
}

fn resolve_category(raw: &Option<String>, reviewer: &str, repairs: &mut Vec<Repair>) -> Category {
    match non_blank(raw).and_then(canonical_category) {
        Some(category) => category,
        None => {
            warn!(
                reviewer = %reviewer,
                raw_category = ?raw,
                "unrecognized category; using general"
            );
            repairs.push(Repair::CategoryFallback { raw: raw.clone() });
            Category::General
        }
    }
}

fn resolve_location(raw: &RawFinding, repairs: &mut Vec<Repair>) -> Location {
    if let Some(file) = non_blank(&raw.file_path) {
        return Location {
            file_path: Some(file.to_string()),
            line_number: raw.line_number,
        };
    }

    match non_blank(&raw.location) {
        Some(loc) => {
            repairs.push(Repair::LocationParsed);
            match loc.rsplit_once(':') {
                Some((file, line)) if !file.is_empty() => match line.trim().parse::<u32>() {
                    Ok(n) => Location::at(file, n),
                    Err(_) => Location::file(loc),
                },
                _ => Location::file(loc),
            }
        }
        None => Location {
            file_path: None,
            line_number: raw.line_number,
        },
    }
}

/// Repair a raw finding into a canonical one.
///
/// Unrecoverable when neither description nor title carries any text.
pub fn normalize_finding(
    reviewer: &str,
    index: usize,
    raw: &RawFinding,
    min_text_len: usize,
) -> Result<Normalized<Finding>, NormalizationIssue> {
    let mut repairs = Vec::new();
    let reviewer = non_blank(&raw.reviewer).unwrap_or(reviewer).to_string();

    let description = match (non_blank(&raw.description), non_blank(&raw.title)) {
        (Some(d), _) => d.to_string(),
        (None, Some(t)) => {
            repairs.push(Repair::DescriptionRecovered);
            t.to_string()
        }
        (None, None) => {
            return Err(NormalizationIssue {
                reviewer,
                item_kind: "finding",
                index,
                reason: "finding has neither description nor title".to_string(),
            })
        }
    };

    let category = resolve_category(&raw.category, &reviewer, &mut repairs);
    let severity = match non_blank(&raw.severity).and_then(parse_severity) {
        Some(s) => s,
        None => {
            repairs.push(Repair::SeverityDefaulted {
                raw: raw.severity.clone(),
            });
            Severity::Medium
        }
    };
    let location = resolve_location(raw, &mut repairs);

    let description =
        match pad_text(&description, &format!("{category} issue reported by {reviewer}"), min_text_len) {
            Some(padded) => {
                repairs.push(Repair::DescriptionPadded);
                padded
            }
            None => description,
        };

    let evidence = match non_blank(&raw.evidence) {
        Some(e) => match pad_text(e, &format!("at {location}"), min_text_len) {
            Some(padded) => {
                repairs.push(Repair::EvidencePadded);
                padded
            }
            None => e.to_string(),
        },
        None => {
            repairs.push(Repair::EvidenceSynthesized);
            format!("Reported at {location}: {description}")
        }
    };

    let impact = match non_blank(&raw.impact) {
        Some(i) => match pad_text(i, &format!("{severity} severity"), min_text_len) {
            Some(padded) => {
                repairs.push(Repair::ImpactPadded);
                padded
            }
            None => i.to_string(),
        },
        None => {
            repairs.push(Repair::ImpactSynthesized);
            format!("{severity} severity {category} issue; impact not assessed by {reviewer}")
        }
    };

    let id = match non_blank(&raw.id) {
        Some(id) => id.to_string(),
        None => {
            repairs.push(Repair::IdSynthesized);
            format!("{reviewer}-{}", index + 1)
        }
    };

    Ok(Normalized {
        value: Finding {
            id,
            category,
            severity,
            description,
            evidence,
            impact,
            location,
            reviewer,
        },
        repairs,
    })
}

/// Repair a raw suggestion into a canonical one.
///
/// `related_finding_id` is carried over untouched; the aggregator rewrites
/// it once canonical finding IDs exist.
pub fn normalize_suggestion(
    reviewer: &str,
    index: usize,
    raw: &RawSuggestion,
    min_text_len: usize,
) -> Result<Normalized<Suggestion>, NormalizationIssue> {
    let mut repairs = Vec::new();
    let reviewer = non_blank(&raw.reviewer).unwrap_or(reviewer).to_string();

    let description = match (non_blank(&raw.description), non_blank(&raw.title)) {
        (Some(d), _) => d.to_string(),
        (None, Some(t)) => {
            repairs.push(Repair::DescriptionRecovered);
            t.to_string()
        }
        (None, None) => {
            return Err(NormalizationIssue {
                reviewer,
                item_kind: "suggestion",
                index,
                reason: "suggestion has neither description nor title".to_string(),
            })
        }
    };

    let category = resolve_category(&raw.category, &reviewer, &mut repairs);
    let priority = match non_blank(&raw.priority).and_then(parse_priority) {
        Some(p) => p,
        None => {
            repairs.push(Repair::PriorityDefaulted {
                raw: raw.priority.clone(),
            });
            Priority::Medium
        }
    };

    let description =
        match pad_text(&description, &format!("{category} suggestion from {reviewer}"), min_text_len) {
            Some(padded) => {
                repairs.push(Repair::DescriptionPadded);
                padded
            }
            None => description,
        };

    let implementation_notes = match non_blank(&raw.implementation_notes) {
        Some(n) => n.to_string(),
        None => {
            repairs.push(Repair::NotesDefaulted);
            DEFAULT_IMPLEMENTATION_NOTES.to_string()
        }
    };

    let id = match non_blank(&raw.id) {
        Some(id) => id.to_string(),
        None => {
            repairs.push(Repair::IdSynthesized);
            format!("{reviewer}-s{}", index + 1)
        }
    };

    Ok(Normalized {
        value: Suggestion {
            id,
            category,
            priority,
            description,
            implementation_notes,
            related_finding_id: non_blank(&raw.related_finding_id).map(str::to_string),
            reviewer,
        },
        repairs,
    })
}
