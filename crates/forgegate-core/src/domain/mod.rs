//! Domain models for forgegate.
//!
//! Canonical definitions for the core entities:
//! - `WorkArtifact`: immutable object under review at a phase
//! - `Finding` / `Suggestion`: normalized specialist output
//! - `AggregatedReport`: one deduplicated review per phase
//! - `DiagnosticReport` / `FixProposal` / `TestResult`: correction collaborator payloads

pub mod artifact;
pub mod error;
pub mod finding;
pub mod repair;
pub mod report;

// Re-export main types and errors
pub use artifact::{ArtifactKind, ContentDigest, Phase, WorkArtifact};
pub use error::{ForgeError, Result};
pub use finding::{Category, Finding, Location, Priority, Severity, Suggestion};
pub use repair::{
    CandidateFix, CodeChange, CorrectionAttempt, DiagnosticReport, FixProposal, TestResult,
};
pub use report::{AggregatedReport, AutomatedCheck, DroppedItem, SeverityCounts, Verdict};
