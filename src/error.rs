//! Error types for tubelist

use thiserror::Error;

/// Main error type for tubelist operations
#[derive(Debug, Error)]
pub enum TubeError {
    #[error("Cipher extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not connected: an access token is required")]
    NotConnected,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TubeError {
    /// Check if error is retryable at the transport layer
    pub fn is_retryable(&self) -> bool {
        match self {
            TubeError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            TubeError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Check if error stops an ingestion session before it reaches its end
    pub fn is_session_abort(&self) -> bool {
        matches!(
            self,
            TubeError::Transport(_) | TubeError::HttpStatus { .. } | TubeError::Cancelled
        )
    }
}
