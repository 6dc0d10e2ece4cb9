// ABOUTME: Core type definitions for preview sandbox tracking
// ABOUTME: Persisted sandbox records, file batches, rebuild actions, and API response shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sandbox lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    /// Sandbox is being provisioned
    Creating,
    /// Sandbox is up and serving a preview
    Running,
    /// Sandbox was explicitly deleted
    Stopped,
    /// Sandbox hit an unrecoverable fault
    Error,
}

impl SandboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxStatus::Creating => "creating",
            SandboxStatus::Running => "running",
            SandboxStatus::Stopped => "stopped",
            SandboxStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> SandboxStatus {
        match s {
            "creating" => SandboxStatus::Creating,
            "running" => SandboxStatus::Running,
            "stopped" => SandboxStatus::Stopped,
            _ => SandboxStatus::Error,
        }
    }

    /// Terminal states are retained only for the stopped-retention window
    pub fn is_terminal(&self) -> bool {
        matches!(self, SandboxStatus::Stopped | SandboxStatus::Error)
    }
}

/// Persisted state for one remote sandbox.
///
/// The store is the system of record; the provider is the system of truth for
/// whether the sandbox still physically exists. The in-memory cache mirrors a
/// subset of these records for low-latency reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxRecord {
    /// Provider-assigned sandbox ID, immutable once created
    pub sandbox_id: String,
    /// Current lifecycle status
    pub status: SandboxStatus,
    /// Public preview URL, set once the sandbox reaches running
    pub preview_url: Option<String>,
    /// Access token for the preview URL
    pub preview_token: Option<String>,
    /// Last failure reason; present only in error status
    pub error: Option<String>,
    /// First observation time, set once
    pub created_at: DateTime<Utc>,
    /// Updated on every successful status read or file update; drives idle detection
    pub last_heartbeat_at: DateTime<Utc>,
    /// Absolute reclamation deadline, independent of heartbeat
    pub expires_at: DateTime<Utc>,
    /// Owning project, merged in on first write that provides it
    pub project_id: Option<String>,
    /// Owning user, merged in on first write that provides it
    pub user_id: Option<String>,
}

impl SandboxRecord {
    /// Build a fresh running record for a just-provisioned sandbox
    pub fn running(sandbox_id: impl Into<String>, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            sandbox_id: sandbox_id.into(),
            status: SandboxStatus::Running,
            preview_url: None,
            preview_token: None,
            error: None,
            created_at: now,
            last_heartbeat_at: now,
            expires_at: now + ttl,
            project_id: None,
            user_id: None,
        }
    }
}

/// A single file pushed into a sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Path relative to the project root inside the sandbox
    pub path: String,
    /// Full file content
    pub content: String,
    /// Caller-declared type hint (advisory; classification goes by path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

/// Rebuild action chosen for a file-update batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildAction {
    /// Dependency manifest or build config changed; reinstall and restart
    Full,
    /// Component source changed; restart the dev server
    Optimized,
    /// Stylesheets only; hot reload handles it
    StyleOnly,
    /// Nothing that affects the build
    None,
}

impl RebuildAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebuildAction::Full => "full",
            RebuildAction::Optimized => "optimized",
            RebuildAction::StyleOnly => "style-only",
            RebuildAction::None => "none",
        }
    }
}

/// Advisory telemetry about a file batch, supplied by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileComparison {
    pub total: usize,
    pub changed: usize,
    pub skipped: usize,
}

/// Response from creating a sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSandboxResponse {
    pub sandbox_id: String,
    pub url: Option<String>,
    pub token: Option<String>,
    pub status: SandboxStatus,
}

/// Report from a file-update operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    pub updated_files: usize,
    pub total_files: usize,
    pub skipped_files: usize,
    pub errors: Vec<String>,
    pub rebuild_action: RebuildAction,
    pub message: String,
}

/// Response from deleting a sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSandboxResponse {
    pub success: bool,
    /// False when the remote resource was already gone
    pub existed: bool,
}

/// Aggregated cleanup/scheduler statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupStats {
    pub creating: usize,
    pub running: usize,
    pub stopped: usize,
    pub error: usize,
    pub total: usize,
    /// Age in seconds of the longest-idle running sandbox
    pub oldest_running_age_secs: Option<i64>,
    /// Age in seconds of the oldest terminal-state record
    pub oldest_stopped_age_secs: Option<i64>,
    pub scheduler_running: bool,
    pub last_idle_sweep_at: Option<DateTime<Utc>>,
}

/// Commands accepted by the cleanup service control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupAction {
    Start,
    Stop,
    /// Run the expired-record purge now
    Cleanup,
    /// Reconcile persisted records against the provider now
    Sync,
    /// Run the idle reclamation pass now
    Memory,
    /// Run the stopped-record purge now
    Stopped,
}

/// Outcome of a cleanup control command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlOutcome {
    pub success: bool,
    pub message: String,
    pub stats: Option<CleanupStats>,
}

/// Generic API response envelope consumed by the routing layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error<E: ToString>(error: E) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SandboxStatus::Creating,
            SandboxStatus::Running,
            SandboxStatus::Stopped,
            SandboxStatus::Error,
        ] {
            assert_eq!(SandboxStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_unknown_status_parses_as_error() {
        assert_eq!(SandboxStatus::parse("???"), SandboxStatus::Error);
    }

    #[test]
    fn test_rebuild_action_serde_names() {
        assert_eq!(
            serde_json::to_string(&RebuildAction::StyleOnly).unwrap(),
            "\"style-only\""
        );
        assert_eq!(
            serde_json::to_string(&RebuildAction::Optimized).unwrap(),
            "\"optimized\""
        );
    }

    #[test]
    fn test_running_record_heartbeat_matches_creation() {
        let record = SandboxRecord::running("sbx-1", chrono::Duration::hours(1));
        assert_eq!(record.created_at, record.last_heartbeat_at);
        assert!(record.expires_at > record.created_at);
        assert_eq!(record.status, SandboxStatus::Running);
    }
}
