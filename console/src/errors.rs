//! Error types for deployctl

use thiserror::Error;

/// Main error type for the deployment console
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Request never reached the server (connect failure, reset, DNS)
    #[error("Network error on {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// 401 that could not be recovered by the fallback retry
    #[error("Unauthorized on {endpoint}: {message}")]
    Unauthorized { endpoint: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success response other than 401/404
    #[error("API error {status}: {detail}")]
    ApiError { status: u16, detail: String },

    /// Rejected locally before any request was sent
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConsoleError {
    /// Failures that the next poll tick may recover from
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConsoleError::Network { .. } | ConsoleError::Timeout { .. } | ConsoleError::HttpError(_)
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ConsoleError::Unauthorized { .. })
    }
}
