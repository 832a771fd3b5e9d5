//! Automated structural checks attached to every aggregated report.
//!
//! These never influence the verdict; they are informational context for
//! whoever reads the report or decides an override.

use super::dispatch::ReviewResults;
use crate::domain::{AutomatedCheck, WorkArtifact};

fn check(name: &str, passed: bool, detail: String) -> AutomatedCheck {
    AutomatedCheck {
        name: name.to_string(),
        passed,
        detail,
    }
}

/// Run the structural checks over an artifact and its review results.
pub fn run_automated_checks(
    artifact: &WorkArtifact,
    results: &ReviewResults,
    max_file_bytes: usize,
) -> Vec<AutomatedCheck> {
    let mut checks = Vec::with_capacity(4);

    checks.push(check(
        "has_source_artifact",
        !artifact.files.is_empty(),
        format!("{} file(s) in artifact", artifact.files.len()),
    ));

    let oversized: Vec<&str> = artifact
        .files
        .iter()
        .filter(|(_, content)| content.len() > max_file_bytes)
        .map(|(path, _)| path.as_str())
        .collect();
    checks.push(check(
        "artifact_size_within_limit",
        oversized.is_empty(),
        if oversized.is_empty() {
            format!("all files <= {max_file_bytes} bytes")
        } else {
            format!("oversized: {}", oversized.join(", "))
        },
    ));

    let empty: Vec<&str> = artifact
        .files
        .iter()
        .filter(|(_, content)| content.trim().is_empty())
        .map(|(path, _)| path.as_str())
        .collect();
    checks.push(check(
        "no_empty_files",
        empty.is_empty(),
        if empty.is_empty() {
            "no empty files".to_string()
        } else {
            format!("empty: {}", empty.join(", "))
        },
    ));

    let responded = results.outputs.len().saturating_sub(results.failed_reviewers.len());
    checks.push(check(
        "reviewers_responded",
        responded > 0,
        format!("{responded}/{} reviewer(s) responded", results.outputs.len()),
    ));

    checks
}
