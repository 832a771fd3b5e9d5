//! Human-readable and machine-readable renderings of an aggregated report.

use std::path::Path;

use crate::domain::{AggregatedReport, Result};

/// Render a Markdown summary of a review.
pub fn render_report_md(report: &AggregatedReport) -> String {
    let mut out = String::new();
    out.push_str("# Review Report\n\n");
    out.push_str(&format!("**Verdict:** {}\n\n", report.verdict));

    if let Some(digest) = &report.artifact_digest {
        out.push_str(&format!("Artifact `{}`\n\n", digest.short()));
    }

    let c = &report.severity_counts;
    out.push_str("## Severity\n");
    out.push_str("| critical | high | medium | low |\n|---|---|---|---|\n");
    out.push_str(&format!(
        "| {} | {} | {} | {} |\n\n",
        c.critical, c.high, c.medium, c.low
    ));

    if !report.findings.is_empty() {
        out.push_str("## Findings\n");
        for f in &report.findings {
            out.push_str(&format!(
                "- **{}** [{}/{}] {} (`{}`, {})\n",
                f.id, f.severity, f.category, f.description, f.location, f.reviewer
            ));
        }
        out.push('\n');
    }

    if !report.suggestions.is_empty() {
        out.push_str("## Suggestions\n");
        for s in &report.suggestions {
            let related = s
                .related_finding_id
                .as_deref()
                .map(|id| format!(" → {id}"))
                .unwrap_or_default();
            out.push_str(&format!(
                "- **{}** [{}] {}{}\n",
                s.id, s.priority, s.description, related
            ));
        }
        out.push('\n');
    }

    out.push_str("## Automated Checks\n");
    for check in &report.automated_checks {
        let mark = if check.passed { "x" } else { " " };
        out.push_str(&format!("- [{}] {}: {}\n", mark, check.name, check.detail));
    }

    if !report.failed_reviewers.is_empty() {
        out.push_str("\n## Failed Reviewers\n");
        for r in &report.failed_reviewers {
            out.push_str(&format!("- `{}`\n", r));
        }
    }

    if !report.dropped.is_empty() {
        out.push_str(&format!("\n{} item(s) dropped during normalization.\n", report.dropped.len()));
    }
    out
}

/// Write report.md.
pub fn write_report_md(path: &Path, report: &AggregatedReport) -> Result<()> {
    std::fs::write(path, render_report_md(report))?;
    Ok(())
}

/// Write report.json.
pub fn write_report_json(path: &Path, report: &AggregatedReport) -> Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AutomatedCheck, Category, Finding, Location, Priority, Severity, SeverityCounts, Suggestion,
        Verdict,
    };

    fn sample() -> AggregatedReport {
        let finding = Finding {
            id: "ISSUE-001".to_string(),
            category: Category::Security,
            severity: Severity::Critical,
            description: "SQL built from user input".to_string(),
            evidence: "cursor.execute(f\"... {name}\")".to_string(),
            impact: "arbitrary query execution".to_string(),
            location: Location::at("db.py", 12),
            reviewer: "security".to_string(),
        };
        AggregatedReport {
            severity_counts: SeverityCounts::from_findings(std::slice::from_ref(&finding)),
            findings: vec![finding],
            suggestions: vec![Suggestion {
                id: "SUGG-001".to_string(),
                category: Category::Security,
                priority: Priority::High,
                description: "Use parameterized queries".to_string(),
                implementation_notes: "cursor.execute(sql, params)".to_string(),
                related_finding_id: Some("ISSUE-001".to_string()),
                reviewer: "security".to_string(),
            }],
            verdict: Verdict::Fail,
            automated_checks: vec![AutomatedCheck {
                name: "has_source_artifact".to_string(),
                passed: true,
                detail: "1 file(s) in artifact".to_string(),
            }],
            duration_ms: 5,
            reviewers: vec!["security".to_string(), "style".to_string()],
            failed_reviewers: vec!["style".to_string()],
            dropped: vec![],
            repairs_applied: 0,
            artifact_digest: None,
        }
    }

    #[test]
    fn render_md_has_sections() {
        let md = render_report_md(&sample());
        assert!(md.contains("**Verdict:** FAIL"));
        assert!(md.contains("| 1 | 0 | 0 | 0 |"));
        assert!(md.contains("ISSUE-001"));
        assert!(md.contains("`db.py:12`"));
        assert!(md.contains("→ ISSUE-001"));
        assert!(md.contains("- [x] has_source_artifact"));
        assert!(md.contains("## Failed Reviewers"));
    }

    #[test]
    fn write_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let report = sample();
        write_report_json(&path, &report).unwrap();
        let back: AggregatedReport =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, report);
    }
}
