// ABOUTME: Preview sandbox lifecycle management for Skiff
// ABOUTME: Provisioning, file sync, state tracking, and background cleanup over Daytona

pub mod adapter;
pub mod cleanup;
pub mod config;
pub mod controller;
pub mod error;
pub mod storage;
pub mod sync;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod testutil;

pub use adapter::{Clock, ProvisionedSandbox, SandboxAdapter, TokioClock};
pub use cleanup::CleanupService;
pub use config::{AdapterConfig, CleanupConfig};
pub use controller::{SandboxCache, SandboxController};
pub use error::{Result, SandboxError};
pub use storage::SandboxStore;
pub use types::{
    ApiResponse, CleanupAction, CleanupStats, ControlOutcome, CreateSandboxResponse,
    DeleteSandboxResponse, FileComparison, ProjectFile, RebuildAction, SandboxRecord,
    SandboxStatus, UpdateReport,
};
