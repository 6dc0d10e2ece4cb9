// ABOUTME: Error types for the Daytona API client
// ABOUTME: Distinguishes not-found lookups from transport and server-side failures

use thiserror::Error;

/// Main error type for Daytona API operations
#[derive(Error, Debug)]
pub enum DaytonaError {
    /// Sandbox does not exist on the provider
    #[error("Sandbox not found: {0}")]
    NotFound(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status
    #[error("Daytona API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DaytonaError {
    /// True when the error means the resource is known to be absent,
    /// as opposed to a lookup that could not be completed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DaytonaError::NotFound(_))
    }
}

/// Type alias for Results that return DaytonaError
pub type Result<T> = std::result::Result<T, DaytonaError>;
