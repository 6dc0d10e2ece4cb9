// ABOUTME: Error types for sandbox lifecycle operations
// ABOUTME: Maps caller mistakes, missing resources, precondition failures, and provider faults

use thiserror::Error;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Malformed caller input (empty or invalid file batch, bad ID)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Sandbox unknown to both the cache and the remote provider
    #[error("Sandbox not found: {0}")]
    NotFound(String),

    /// Operation requires running state or remote existence and it is not met
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Remote SDK call failed during create/update/delete
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// State store read/write failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Daytona API error
    #[error("Daytona error: {0}")]
    Daytona(#[from] skiff_daytona::DaytonaError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SandboxError {
    /// True for errors the API layer should report as client-caused (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SandboxError::Validation(_) | SandboxError::NotFound(_) | SandboxError::Precondition(_)
        )
    }
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
