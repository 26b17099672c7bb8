//! Domain-level error taxonomy for Optisynth.

/// Optisynth domain errors.
///
/// The first five variants are the workflow failure taxonomy; the rest are
/// plumbing faults raised by configuration, persistence and serialization.
#[derive(Debug, thiserror::Error)]
pub enum OptisynthError {
    #[error("generation failure ({role}): {reason}")]
    GenerationFailure { role: String, reason: String },

    #[error("assembly failure: {0}")]
    AssemblyFailure(String),

    #[error("execution failure: {0}")]
    ExecutionFailure(String),

    #[error("review verdict could not be parsed: {0}")]
    ReviewParseFailure(String),

    #[error("manager decision is ambiguous: {0}")]
    DecisionAmbiguity(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("sandbox error: {0}")]
    Sandbox(#[from] crate::sandbox::SandboxError),

    #[error("collaborator error: {0}")]
    Collaborator(#[from] crate::collaborator::CollaboratorError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OptisynthError {
    /// Shorthand for a [`OptisynthError::GenerationFailure`].
    pub fn generation(role: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::GenerationFailure {
            role: role.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for Optisynth domain operations.
pub type Result<T> = std::result::Result<T, OptisynthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_failure_display_names_role() {
        let err = OptisynthError::generation("designer", "empty reply");
        let msg = err.to_string();
        assert!(msg.contains("designer"));
        assert!(msg.contains("empty reply"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = OptisynthError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_taxonomy_variants_have_distinct_prefixes() {
        let errs = [
            OptisynthError::AssemblyFailure("x".into()).to_string(),
            OptisynthError::ExecutionFailure("x".into()).to_string(),
            OptisynthError::ReviewParseFailure("x".into()).to_string(),
            OptisynthError::DecisionAmbiguity("x".into()).to_string(),
        ];
        assert!(errs[0].starts_with("assembly failure"));
        assert!(errs[1].starts_with("execution failure"));
        assert!(errs[2].starts_with("review verdict"));
        assert!(errs[3].starts_with("manager decision"));
    }
}
