//! Work artifacts and their content digests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::{ForgeError, Result};
use super::repair::CodeChange;

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Plan,
    Design,
    Implement,
    Test,
}

impl Phase {
    /// The canonical plan → design → implement → test ordering.
    pub fn standard_sequence() -> Vec<Phase> {
        vec![Phase::Plan, Phase::Design, Phase::Implement, Phase::Test]
    }

    /// Artifact kind a phase produces.
    pub fn artifact_kind(self) -> ArtifactKind {
        match self {
            Phase::Plan => ArtifactKind::Plan,
            Phase::Design => ArtifactKind::Design,
            Phase::Implement | Phase::Test => ArtifactKind::Code,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Plan => "plan",
            Phase::Design => "design",
            Phase::Implement => "implement",
            Phase::Test => "test",
        };
        write!(f, "{s}")
    }
}

/// What kind of object an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Plan,
    Design,
    Code,
    Fix,
}

/// Content digest (SHA-256 hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The object under review at a given phase.
///
/// Artifacts are never mutated. A correction produces a new artifact through
/// [`WorkArtifact::supersede`], which links back to its parent by digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkArtifact {
    pub id: Uuid,
    pub kind: ArtifactKind,
    /// File path → content, ordered for a deterministic digest.
    pub files: BTreeMap<String, String>,
    /// 0 for a freshly produced artifact, +1 per superseding correction.
    pub revision: u32,
    pub parent_digest: Option<ContentDigest>,
    pub digest: ContentDigest,
}

impl WorkArtifact {
    /// Create a fresh artifact from its files.
    pub fn new(kind: ArtifactKind, files: BTreeMap<String, String>) -> Self {
        let digest = compute_files_digest(&files);
        Self {
            id: Uuid::new_v4(),
            kind,
            files,
            revision: 0,
            parent_digest: None,
            digest,
        }
    }

    /// Convenience constructor for a single-file artifact.
    pub fn single(kind: ArtifactKind, path: impl Into<String>, content: impl Into<String>) -> Self {
        let mut files = BTreeMap::new();
        files.insert(path.into(), content.into());
        Self::new(kind, files)
    }

    /// Total size of all file contents in bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(String::len).sum()
    }

    /// Apply `changes` and return the superseding artifact.
    ///
    /// All-or-nothing: if any change fails to apply, no artifact is produced
    /// and `self` is untouched.
    pub fn supersede(&self, changes: &[CodeChange]) -> Result<WorkArtifact> {
        if changes.is_empty() {
            return Err(ForgeError::InvalidArtifact(
                "no changes to apply".to_string(),
            ));
        }

        let mut files = self.files.clone();
        for change in changes {
            let content = files
                .get_mut(&change.file_path)
                .ok_or_else(|| ForgeError::ApplyFailed {
                    file_path: change.file_path.clone(),
                    reason: "file not present in artifact".to_string(),
                })?;
            if change.search.is_empty() {
                return Err(ForgeError::ApplyFailed {
                    file_path: change.file_path.clone(),
                    reason: "empty search text".to_string(),
                });
            }
            if !content.contains(&change.search) {
                return Err(ForgeError::ApplyFailed {
                    file_path: change.file_path.clone(),
                    reason: "search text not found".to_string(),
                });
            }
            *content = content.replacen(&change.search, &change.replace, 1);
        }

        let digest = compute_files_digest(&files);
        Ok(WorkArtifact {
            id: Uuid::new_v4(),
            kind: self.kind,
            files,
            revision: self.revision + 1,
            parent_digest: Some(self.digest.clone()),
            digest,
        })
    }
}

/// Deterministic digest of an ordered file map.
fn compute_files_digest(files: &BTreeMap<String, String>) -> ContentDigest {
    let mut hasher = Sha256::new();
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(content.as_bytes());
        hasher.update(b"\0");
    }
    ContentDigest(hex::encode(hasher.finalize()))
}
