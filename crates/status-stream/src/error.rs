//! Error types for status stream client operations

use thiserror::Error;

/// Result type alias for status stream client operations
pub type Result<T> = std::result::Result<T, StatusStreamError>;

/// Errors returned synchronously by the client API
///
/// Failures discovered after a subscription is running are never returned
/// through this type; they show up as the subscription's close reason.
#[derive(Error, Debug)]
pub enum StatusStreamError {
    /// Identifier was empty or could not be used as a path segment
    #[error("Invalid service identifier: {0}")]
    InvalidIdentifier(String),

    /// Invalid base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Base URL cannot carry path segments (e.g. `mailto:`)
    #[error("Base URL cannot be a base: {0}")]
    CannotBeABase(String),

    /// Building the HTTP client failed
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// No Tokio runtime to run the connection task on
    #[error("Tokio runtime required: {0}")]
    Runtime(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StatusStreamError {
    /// Create an invalid identifier error
    pub fn invalid_identifier(reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier(reason.into())
    }
}
