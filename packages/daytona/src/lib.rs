// ABOUTME: Daytona provisioning API client for Skiff
// ABOUTME: Async trait over the remote sandbox REST API plus a reqwest-backed implementation

pub mod client;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use client::{DaytonaApi, DaytonaClient};
pub use error::{DaytonaError, Result};
pub use types::{CreateSandboxRequest, ExecResult, PreviewLink, RemoteSandbox};
