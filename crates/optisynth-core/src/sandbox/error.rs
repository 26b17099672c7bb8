//! Error types for the sandbox module.
//!
//! A program that runs and fails is not an error here; it is an
//! [`ExecutionResult`](super::ExecutionResult) with `success == false`.
//! These variants cover faults of the sandbox itself.

/// Errors produced by the sandbox layer.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to start interpreter {interpreter}: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("program execution timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    #[error("run context could not be encoded: {0}")]
    Context(#[from] serde_json::Error),

    #[error("sandbox io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
