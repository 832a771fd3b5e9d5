//! Merge per-reviewer output into one [`AggregatedReport`].
//!
//! Aggregation runs in a fixed order:
//!
//! 1. normalize every raw item (repair or drop)
//! 2. deduplicate findings by location, else by evidence; higher severity wins
//! 3. deduplicate suggestions by description
//! 4. assign canonical `ISSUE-nnn` / `SUGG-nnn` identifiers
//! 5. rewrite suggestion references onto canonical IDs, clearing any that
//!    cannot be resolved
//! 6. count severities, run automated checks and stamp the gate verdict

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::checks::run_automated_checks;
use super::dispatch::ReviewResults;
use super::normalize::{normalize_finding, normalize_suggestion, MIN_TEXT_LEN};
use crate::domain::{AggregatedReport, DroppedItem, Finding, SeverityCounts, Suggestion, WorkArtifact};
use crate::metrics::METRICS;
use crate::quality_gate::QualityGate;

/// Largest single file the size check accepts.
pub const DEFAULT_MAX_FILE_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub max_file_bytes: usize,
    pub min_text_len: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            min_text_len: MIN_TEXT_LEN,
        }
    }
}

/// Merges specialist output and stamps it with its gate's verdict.
#[derive(Debug, Clone, Default)]
pub struct ReviewAggregator {
    config: AggregatorConfig,
    gate: QualityGate,
}

/// Old (reviewer, id) pairs → canonical finding IDs.
#[derive(Default)]
struct IdMap {
    scoped: HashMap<(String, String), String>,
    global: HashMap<String, Vec<String>>,
}

impl IdMap {
    fn insert(&mut self, reviewer: &str, old_id: &str, canonical: &str) {
        self.scoped
            .insert((reviewer.to_string(), old_id.to_string()), canonical.to_string());
        let ids = self.global.entry(old_id.to_string()).or_default();
        if !ids.iter().any(|id| id == canonical) {
            ids.push(canonical.to_string());
        }
    }

    /// Same-reviewer match, then a globally unique match, then a unique
    /// prefix match in either direction.
    fn resolve(&self, reviewer: &str, old_id: &str) -> Option<String> {
        if let Some(id) = self.scoped.get(&(reviewer.to_string(), old_id.to_string())) {
            return Some(id.clone());
        }
        if let Some([only]) = self.global.get(old_id).map(Vec::as_slice) {
            return Some(only.clone());
        }

        let wanted = old_id.to_lowercase();
        let mut candidates: Vec<&String> = self
            .global
            .iter()
            .filter(|(known, _)| {
                let known = known.to_lowercase();
                known.starts_with(&wanted) || wanted.starts_with(&known)
            })
            .flat_map(|(_, ids)| ids.iter())
            .collect();
        candidates.sort();
        candidates.dedup();
        match candidates.as_slice() {
            [only] => Some((*only).clone()),
            _ => None,
        }
    }
}

/// A finding plus every (reviewer, id) it absorbed while deduplicating.
struct Slot {
    finding: Finding,
    aliases: Vec<(String, String)>,
}

fn dedup_key(finding: &Finding) -> String {
    match (&finding.location.file_path, finding.location.line_number) {
        (Some(file), Some(line)) => format!("loc:{file}:{line}"),
        _ => format!("evidence:{}", finding.evidence.trim().to_lowercase()),
    }
}

impl ReviewAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            gate: QualityGate::default(),
        }
    }

    /// Use `gate` to stamp the verdict.
    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Merge `results` for `artifact` into one consistent report.
    ///
    /// Never fails: unrepairable items are listed in `dropped` and
    /// unresolvable references are cleared.
    pub fn aggregate(&self, artifact: &WorkArtifact, results: &ReviewResults) -> AggregatedReport {
        let start = Instant::now();
        let min_len = self.config.min_text_len;
        let mut dropped: Vec<DroppedItem> = Vec::new();
        let mut repairs_applied = 0usize;

        // 1. normalize
        let mut findings: Vec<Finding> = Vec::new();
        let mut suggestions: Vec<Suggestion> = Vec::new();
        for (reviewer, output) in &results.outputs {
            for (index, raw) in output.findings.iter().enumerate() {
                match normalize_finding(reviewer, index, raw, min_len) {
                    Ok(n) => {
                        if !n.repairs.is_empty() {
                            debug!(reviewer = %reviewer, index, repairs = ?n.repairs, "finding repaired");
                        }
                        repairs_applied += n.repairs.len();
                        findings.push(n.value);
                    }
                    Err(issue) => {
                        warn!(%issue, "dropping finding");
                        dropped.push(issue.into());
                    }
                }
            }
            for (index, raw) in output.suggestions.iter().enumerate() {
                match normalize_suggestion(reviewer, index, raw, min_len) {
                    Ok(n) => {
                        if !n.repairs.is_empty() {
                            debug!(reviewer = %reviewer, index, repairs = ?n.repairs, "suggestion repaired");
                        }
                        repairs_applied += n.repairs.len();
                        suggestions.push(n.value);
                    }
                    Err(issue) => {
                        warn!(%issue, "dropping suggestion");
                        dropped.push(issue.into());
                    }
                }
            }
        }

        // 2. deduplicate findings
        let mut slots: Vec<Slot> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut merged = 0u64;
        for finding in findings {
            let key = dedup_key(&finding);
            let alias = (finding.reviewer.clone(), finding.id.clone());
            match by_key.get(&key) {
                Some(&i) => {
                    merged += 1;
                    let slot = &mut slots[i];
                    slot.aliases.push(alias);
                    if finding.severity > slot.finding.severity {
                        slot.finding = finding;
                    }
                }
                None => {
                    by_key.insert(key, slots.len());
                    slots.push(Slot {
                        finding,
                        aliases: vec![alias],
                    });
                }
            }
        }
        METRICS.add_findings_merged(merged);

        // 3. deduplicate suggestions
        let mut seen = HashSet::new();
        suggestions.retain(|s| seen.insert(s.description.clone()));

        // 4. canonical IDs
        let mut ids = IdMap::default();
        let findings: Vec<Finding> = slots
            .into_iter()
            .enumerate()
            .map(|(n, slot)| {
                let canonical = format!("ISSUE-{:03}", n + 1);
                for (reviewer, old_id) in &slot.aliases {
                    ids.insert(reviewer, old_id, &canonical);
                }
                Finding {
                    id: canonical,
                    ..slot.finding
                }
            })
            .collect();

        // 5. references
        for (n, suggestion) in suggestions.iter_mut().enumerate() {
            suggestion.id = format!("SUGG-{:03}", n + 1);
            if let Some(old) = suggestion.related_finding_id.take() {
                suggestion.related_finding_id = ids.resolve(&suggestion.reviewer, &old);
                if suggestion.related_finding_id.is_none() {
                    warn!(
                        suggestion = %suggestion.id,
                        reviewer = %suggestion.reviewer,
                        reference = %old,
                        "unresolvable finding reference cleared"
                    );
                }
            }
        }

        // 6. counts, checks, verdict
        let severity_counts = SeverityCounts::from_findings(&findings);
        let automated_checks = run_automated_checks(artifact, results, self.config.max_file_bytes);
        let verdict = self.gate.evaluate(&severity_counts);

        info!(
            gate = %self.gate.name,
            findings = findings.len(),
            suggestions = suggestions.len(),
            merged,
            dropped = dropped.len(),
            verdict = %verdict,
            "review aggregated"
        );

        AggregatedReport {
            findings,
            suggestions,
            severity_counts,
            verdict,
            automated_checks,
            duration_ms: results.duration_ms + start.elapsed().as_millis() as u64,
            reviewers: results.reviewer_names(),
            failed_reviewers: results.failed_reviewers.clone(),
            dropped,
            repairs_applied,
            artifact_digest: Some(artifact.digest.clone()),
        }
    }
}
