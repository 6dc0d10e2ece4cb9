// ABOUTME: Tunable thresholds and command constants for sandbox provisioning and cleanup
// ABOUTME: All timing policy lives here so tests can shrink the windows

use std::time::Duration;

/// Port the dev server binds inside the sandbox
pub const DEFAULT_DEV_PORT: u16 = 5173;

/// Readiness polling bounds
pub const MAX_READY_ATTEMPTS: u32 = 30;
pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Delay after launching the dev server before the first readiness probe
pub const SERVER_START_DELAY: Duration = Duration::from_secs(3);

/// Working directory for project files inside the sandbox
pub const SANDBOX_WORKDIR: &str = "/home/daytona/project";

/// UI-framework plugin pinned into every generated dependency manifest
pub const REACT_PLUGIN: &str = "@vitejs/plugin-react";
pub const REACT_PLUGIN_VERSION: &str = "^4.3.1";
/// Conflicting alternative compiler plugin removed when present
pub const REACT_SWC_PLUGIN: &str = "@vitejs/plugin-react-swc";

/// Label keys applied to every sandbox this service creates
pub const MANAGED_LABEL: &str = "skiff.managed";
pub const PROJECT_LABEL: &str = "skiff.project_id";
pub const USER_LABEL: &str = "skiff.user_id";

/// Settings for the remote sandbox adapter
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub dev_port: u16,
    pub max_ready_attempts: u32,
    pub ready_poll_interval: Duration,
    pub server_start_delay: Duration,
    /// Absolute lifetime granted to each sandbox at creation
    pub sandbox_ttl: chrono::Duration,
    pub workdir: String,
    /// Snapshot the provider boots sandboxes from
    pub snapshot: Option<String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            dev_port: DEFAULT_DEV_PORT,
            max_ready_attempts: MAX_READY_ATTEMPTS,
            ready_poll_interval: READY_POLL_INTERVAL,
            server_start_delay: SERVER_START_DELAY,
            sandbox_ttl: chrono::Duration::hours(1),
            workdir: SANDBOX_WORKDIR.to_string(),
            snapshot: None,
        }
    }
}

/// Timing policy for the cleanup scheduler
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Hard ceiling on record age regardless of status
    pub max_sandbox_age: chrono::Duration,
    /// Heartbeat age after which a running sandbox is reclaimed
    pub idle_threshold: chrono::Duration,
    /// How long terminal-state records linger for audit
    pub stopped_retention: chrono::Duration,
    pub expired_purge_interval: Duration,
    pub idle_sweep_interval: Duration,
    pub stopped_purge_interval: Duration,
    /// Minimum spacing between idle sweeps, guards re-entrant overlap
    pub idle_sweep_cooldown: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_sandbox_age: chrono::Duration::hours(24),
            idle_threshold: chrono::Duration::minutes(10),
            stopped_retention: chrono::Duration::hours(2),
            expired_purge_interval: Duration::from_secs(60 * 60),
            idle_sweep_interval: Duration::from_secs(5 * 60),
            stopped_purge_interval: Duration::from_secs(60 * 60),
            idle_sweep_cooldown: Duration::from_secs(4 * 60),
        }
    }
}
