// ABOUTME: Wire types for the Daytona provisioning API
// ABOUTME: Request/response shapes for sandbox CRUD, session exec, and preview links

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request body for creating a new sandbox
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSandboxRequest {
    /// Snapshot/image to boot the sandbox from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    /// Labels for tracking ownership and association
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    /// Minutes of inactivity before the provider auto-stops the sandbox
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_stop_interval: Option<u32>,
    /// Minutes before the provider auto-deletes a stopped sandbox
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delete_interval: Option<u32>,
}

/// A sandbox as reported by the provider
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSandbox {
    /// Provider-assigned sandbox ID
    pub id: String,
    /// Provider-side state string (e.g. "started", "stopped")
    #[serde(default)]
    pub state: Option<String>,
    /// Labels supplied at creation
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Creation timestamp, if the provider reports one
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of a command executed through a sandbox session
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Process exit code; zero means success
    pub exit_code: i64,
    /// Combined stdout/stderr output
    pub output: String,
}

impl ExecResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Preview URL and access token for a port exposed by a sandbox
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewLink {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Raw session exec response from the provider
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionExecResponse {
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub output: Option<String>,
}
