//! Parallel fan-out of one artifact to every specialist reviewer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::raw::ReviewerOutput;
use crate::domain::{Result, WorkArtifact};
use crate::metrics::METRICS;

/// A specialist that reviews one artifact.
///
/// Implementations must be independent: the dispatcher runs them
/// concurrently and a failure in one never affects the others.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Stable name used as the key in [`ReviewResults`].
    fn name(&self) -> &str;

    async fn review(&self, artifact: &WorkArtifact) -> Result<ReviewerOutput>;
}

/// Per-reviewer output of one dispatch, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewResults {
    pub outputs: Vec<(String, ReviewerOutput)>,
    /// Reviewers that errored or panicked; their entry in `outputs` is empty.
    pub failed_reviewers: Vec<String>,
    pub duration_ms: u64,
}

impl ReviewResults {
    /// Build results directly, e.g. from recorded reviewer output.
    pub fn from_outputs<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = (S, ReviewerOutput)>,
        S: Into<String>,
    {
        Self {
            outputs: outputs.into_iter().map(|(n, o)| (n.into(), o)).collect(),
            failed_reviewers: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn reviewer_names(&self) -> Vec<String> {
        self.outputs.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn get(&self, reviewer: &str) -> Option<&ReviewerOutput> {
        self.outputs
            .iter()
            .find(|(name, _)| name == reviewer)
            .map(|(_, output)| output)
    }
}

/// Give repeated reviewer names a `#n` suffix so results stay keyed uniquely.
fn unique_names(reviewers: &[Arc<dyn Reviewer>]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    reviewers
        .iter()
        .map(|r| {
            let base = r.name();
            let mut name = base.to_string();
            let mut n = 1;
            while taken.contains(&name) {
                n += 1;
                name = format!("{base}#{n}");
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// Run every reviewer concurrently against the same artifact.
///
/// A reviewer that returns an error or panics is logged, listed in
/// `failed_reviewers` and contributes an empty [`ReviewerOutput`]. Results
/// are collected only after all reviewers finish.
pub async fn dispatch_reviewers(
    reviewers: &[Arc<dyn Reviewer>],
    artifact: &WorkArtifact,
) -> ReviewResults {
    let start = Instant::now();
    let artifact = Arc::new(artifact.clone());
    let names = unique_names(reviewers);

    let handles: Vec<_> = reviewers
        .iter()
        .map(|reviewer| {
            let reviewer = Arc::clone(reviewer);
            let artifact = Arc::clone(&artifact);
            METRICS.inc_reviews_dispatched();
            tokio::spawn(async move { reviewer.review(&artifact).await })
        })
        .collect();

    let joined = futures::future::join_all(handles).await;

    let mut outputs = Vec::with_capacity(joined.len());
    let mut failed_reviewers = Vec::new();
    for (name, result) in names.into_iter().zip(joined) {
        let output = match result {
            Ok(Ok(output)) => {
                debug!(
                    reviewer = %name,
                    findings = output.findings.len(),
                    suggestions = output.suggestions.len(),
                    "reviewer finished"
                );
                output
            }
            Ok(Err(e)) => {
                warn!(reviewer = %name, error = %e, "reviewer failed; using empty result");
                METRICS.inc_reviewer_failures();
                failed_reviewers.push(name.clone());
                ReviewerOutput::empty()
            }
            Err(join_err) => {
                warn!(reviewer = %name, error = %join_err, "reviewer panicked; using empty result");
                METRICS.inc_reviewer_failures();
                failed_reviewers.push(name.clone());
                ReviewerOutput::empty()
            }
        };
        outputs.push((name, output));
    }

    ReviewResults {
        outputs,
        failed_reviewers,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactKind, ForgeError};
    use crate::review::raw::RawFinding;

    struct Named(&'static str);

    #[async_trait]
    impl Reviewer for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn review(&self, _artifact: &WorkArtifact) -> Result<ReviewerOutput> {
            if self.0 == "broken" {
                return Err(ForgeError::collaborator(self.0, "model timeout"));
            }
            Ok(ReviewerOutput {
                findings: vec![RawFinding {
                    description: Some(format!("{} says hello", self.0)),
                    ..Default::default()
                }],
                suggestions: vec![],
            })
        }
    }

    #[test]
    fn test_unique_names_suffixes_repeats() {
        let reviewers: Vec<Arc<dyn Reviewer>> =
            vec![Arc::new(Named("style")), Arc::new(Named("style")), Arc::new(Named("docs"))];
        assert_eq!(unique_names(&reviewers), vec!["style", "style#2", "docs"]);
    }

    #[test]
    fn test_unique_names_skip_names_already_taken() {
        let reviewers: Vec<Arc<dyn Reviewer>> = vec![
            Arc::new(Named("style")),
            Arc::new(Named("style")),
            Arc::new(Named("style#2")),
            Arc::new(Named("style")),
        ];
        let names = unique_names(&reviewers);
        assert_eq!(names, vec!["style", "style#2", "style#2#2", "style#3"]);
        let distinct: HashSet<&String> = names.iter().collect();
        assert_eq!(distinct.len(), names.len());
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let reviewers: Vec<Arc<dyn Reviewer>> = vec![
            Arc::new(Named("security")),
            Arc::new(Named("broken")),
            Arc::new(Named("style")),
        ];
        let artifact = WorkArtifact::single(ArtifactKind::Code, "main.py", "print('hi')\n");

        let results = dispatch_reviewers(&reviewers, &artifact).await;

        assert_eq!(results.reviewer_names(), vec!["security", "broken", "style"]);
        assert_eq!(results.failed_reviewers, vec!["broken"]);
        assert!(results.get("broken").unwrap().is_empty());
        assert_eq!(results.get("security").unwrap().findings.len(), 1);
        assert_eq!(results.get("style").unwrap().findings.len(), 1);
    }

    #[tokio::test]
    async fn test_no_reviewers_yields_empty_results() {
        let artifact = WorkArtifact::single(ArtifactKind::Plan, "plan.md", "# plan\n");
        let results = dispatch_reviewers(&[], &artifact).await;
        assert!(results.outputs.is_empty());
        assert!(results.failed_reviewers.is_empty());
    }
}
