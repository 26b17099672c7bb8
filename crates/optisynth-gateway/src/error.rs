//! Gateway errors.

/// Failures talking to the chat completion endpoint.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid gateway configuration: {0}")]
    Config(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response contained no choices")]
    NoChoices,
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
