//! Upstream error types.

use thiserror::Error;

/// Errors from calls to the model provider.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Connection, TLS or timeout failure.
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Body was not the JSON we expected.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl LLMError {
    /// Upstream HTTP status, if the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            LLMError::Api { status, .. } => Some(*status),
            LLMError::Request(e) => e.status().map(|s| s.as_u16()),
            LLMError::Decode(_) => None,
        }
    }
}
