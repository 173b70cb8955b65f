//! Error types for the vapetrack_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vapetrack_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP transport error talking to the remote backend
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// User input rejected before any state change
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication failure, always surfaced to the caller
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Remote backend answered with an error
    #[error("Remote error: {0}")]
    Remote(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Distinguishable authentication failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email address has not been confirmed")]
    EmailNotConfirmed,

    #[error("an account with this email already exists")]
    UserExists,

    #[error("remote backend is not configured")]
    NotConfigured,

    #[error("{0}")]
    Rejected(String),
}
