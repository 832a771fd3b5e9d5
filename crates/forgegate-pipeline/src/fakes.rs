//! In-memory fakes for the correction and production traits (testing only)
//!
//! Provides `ScriptedDiagnoser`, `ScriptedFixProposer`, `ContentTestRunner`,
//! `ScriptedTestRunner`, `CountingApplier` and `StaticProducer`.
//! Scripted fakes replay their script in order and repeat the last entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use forgegate_core::{
    CandidateFix, CodeChange, CorrectionAttempt, DiagnosticReport, FixProposal, ForgeError,
    Location, Phase, Result, TestResult, WorkArtifact,
};

use crate::correction::{ChangeApplier, Diagnoser, FixProposer, InMemoryApplier, TestRunner};
use crate::orchestrator::ArtifactProducer;

/// Pick the `n`th entry of a script, repeating the last one.
fn scripted<T: Clone>(script: &[T], n: usize) -> Option<T> {
    script.get(n).or_else(|| script.last()).cloned()
}

/// A well-formed diagnosis proposing a single change.
pub fn diagnosis_for(change: &CodeChange, confidence: f64) -> DiagnosticReport {
    DiagnosticReport {
        root_cause: format!(
            "{} contains `{}` where `{}` is expected by the failing test",
            change.file_path, change.search, change.replace
        ),
        affected_locations: vec![Location::file(change.file_path.clone())],
        candidate_fixes: vec![CandidateFix {
            description: format!("replace `{}`", change.search),
            changes: vec![change.clone()],
        }],
        confidence,
    }
}

/// A well-formed proposal applying `change`.
pub fn proposal_for(change: &CodeChange, confidence: f64) -> FixProposal {
    FixProposal {
        strategy: format!("targeted edit of {}", change.file_path),
        changes: vec![change.clone()],
        confidence,
    }
}

// ---------------------------------------------------------------------------
// ScriptedDiagnoser
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ScriptedDiagnoser {
    script: Vec<DiagnosticReport>,
    calls: AtomicUsize,
}

impl ScriptedDiagnoser {
    pub fn new(script: Vec<DiagnosticReport>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(report: DiagnosticReport) -> Self {
        Self::new(vec![report])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Diagnoser for ScriptedDiagnoser {
    async fn diagnose(&self, _artifact: &WorkArtifact, _evidence: &TestResult) -> Result<DiagnosticReport> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        scripted(&self.script, n).ok_or_else(|| ForgeError::collaborator("diagnoser", "empty script"))
    }
}

// ---------------------------------------------------------------------------
// ScriptedFixProposer
// ---------------------------------------------------------------------------

/// Replays proposals and records how much history each call saw.
#[derive(Debug)]
pub struct ScriptedFixProposer {
    script: Vec<FixProposal>,
    calls: AtomicUsize,
    history_lens: Mutex<Vec<usize>>,
}

impl ScriptedFixProposer {
    pub fn new(script: Vec<FixProposal>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            history_lens: Mutex::new(Vec::new()),
        }
    }

    pub fn always(proposal: FixProposal) -> Self {
        Self::new(vec![proposal])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn history_lens(&self) -> Vec<usize> {
        self.history_lens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FixProposer for ScriptedFixProposer {
    async fn propose_fix(
        &self,
        _diagnosis: &DiagnosticReport,
        history: &[CorrectionAttempt],
    ) -> Result<FixProposal> {
        self.history_lens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(history.len());
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        scripted(&self.script, n).ok_or_else(|| ForgeError::collaborator("fix_proposer", "empty script"))
    }
}

// ---------------------------------------------------------------------------
// Test runners
// ---------------------------------------------------------------------------

/// Passes when `file` contains `needle`, fails otherwise.
#[derive(Debug)]
pub struct ContentTestRunner {
    file: String,
    needle: String,
    total: u32,
    calls: AtomicUsize,
}

impl ContentTestRunner {
    pub fn new(file: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            needle: needle.into(),
            total: 4,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestRunner for ContentTestRunner {
    async fn run_tests(&self, artifact: &WorkArtifact) -> Result<TestResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fixed = artifact
            .files
            .get(&self.file)
            .is_some_and(|content| content.contains(&self.needle));
        Ok(if fixed {
            TestResult::passing(self.total)
        } else {
            TestResult::failing(self.total, 1)
                .with_failure(format!("{} does not contain `{}`", self.file, self.needle))
        })
    }
}

/// Replays test results regardless of the artifact.
#[derive(Debug)]
pub struct ScriptedTestRunner {
    script: Vec<TestResult>,
    calls: AtomicUsize,
}

impl ScriptedTestRunner {
    pub fn new(script: Vec<TestResult>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(result: TestResult) -> Self {
        Self::new(vec![result])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestRunner for ScriptedTestRunner {
    async fn run_tests(&self, _artifact: &WorkArtifact) -> Result<TestResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        scripted(&self.script, n).ok_or_else(|| ForgeError::collaborator("test_runner", "empty script"))
    }
}

// ---------------------------------------------------------------------------
// CountingApplier
// ---------------------------------------------------------------------------

/// [`InMemoryApplier`] that counts apply and rollback calls.
#[derive(Debug, Default)]
pub struct CountingApplier {
    inner: InMemoryApplier,
    applies: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl CountingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_count(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeApplier for CountingApplier {
    async fn apply(&self, base: &WorkArtifact, changes: &[CodeChange]) -> Result<WorkArtifact> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        self.inner.apply(base, changes).await
    }

    async fn rollback(&self, base: &WorkArtifact) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback(base).await
    }
}

// ---------------------------------------------------------------------------
// StaticProducer
// ---------------------------------------------------------------------------

/// Hands out a fixed artifact per phase; phases without one get a small
/// placeholder document.
#[derive(Debug, Default)]
pub struct StaticProducer {
    artifacts: HashMap<Phase, WorkArtifact>,
    calls: AtomicUsize,
}

impl StaticProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, phase: Phase, artifact: WorkArtifact) -> Self {
        self.artifacts.insert(phase, artifact);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactProducer for StaticProducer {
    async fn produce(&self, phase: Phase, _previous: Option<&WorkArtifact>) -> Result<WorkArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.artifacts.get(&phase) {
            Some(artifact) => artifact.clone(),
            None => WorkArtifact::single(
                phase.artifact_kind(),
                format!("{phase}.md"),
                format!("# {phase}\n\nProduced for the {phase} phase.\n"),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgegate_core::ArtifactKind;

    #[test]
    fn scripted_repeats_last_entry() {
        assert_eq!(scripted(&[1, 2], 0), Some(1));
        assert_eq!(scripted(&[1, 2], 5), Some(2));
        assert_eq!(scripted::<u8>(&[], 0), None);
    }

    #[test]
    fn helpers_build_valid_payloads() {
        let change = CodeChange::new("calc.py", "return a - b", "return a + b");
        assert!(diagnosis_for(&change, 0.9).validate().is_ok());
        assert!(proposal_for(&change, 0.9).validate().is_ok());
    }

    #[tokio::test]
    async fn content_runner_checks_needle() {
        let runner = ContentTestRunner::new("calc.py", "a + b");
        let broken = WorkArtifact::single(ArtifactKind::Code, "calc.py", "return a - b");
        let fixed = WorkArtifact::single(ArtifactKind::Code, "calc.py", "return a + b");
        assert!(!runner.run_tests(&broken).await.unwrap().all_passed());
        assert!(runner.run_tests(&fixed).await.unwrap().all_passed());
        assert_eq!(runner.call_count(), 2);
    }
}
