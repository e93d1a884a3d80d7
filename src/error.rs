//! weaveproxy Error Types

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for weaveproxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// weaveproxy error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Store errors
    #[error("Store error: {0}")]
    Store(String),

    // Upstream errors
    #[error("Node discovery failed for user {user}: {reason}")]
    Discovery { user: String, reason: String },

    #[error("Upstream request to {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    // Request errors
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Network error: {0}")]
    Network(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status returned to the client when a request fails with this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Discovery { .. } | Error::Fetch { .. } => StatusCode::BAD_GATEWAY,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if the failure was caused by something outside this process
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Discovery { .. } | Error::Fetch { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(format!("SQLite error: {}", e))
    }
}
