//! Domain-level error taxonomy for forgegate.

/// forgegate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("collaborator {name} failed: {message}")]
    Collaborator { name: String, message: String },

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("failed to apply change to {file_path}: {reason}")]
    ApplyFailed { file_path: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForgeError {
    /// Wrap a collaborator failure with the collaborator's name.
    pub fn collaborator(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for forgegate domain operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_display() {
        let err = ForgeError::collaborator("security-reviewer", "rate limited");
        let msg = err.to_string();
        assert!(msg.contains("security-reviewer"));
        assert!(msg.contains("rate limited"));
    }

    #[test]
    fn test_apply_failed_display() {
        let err = ForgeError::ApplyFailed {
            file_path: "src/lib.rs".to_string(),
            reason: "search text not found".to_string(),
        };
        assert!(err.to_string().contains("src/lib.rs"));
        assert!(err.to_string().contains("search text not found"));
    }
}
