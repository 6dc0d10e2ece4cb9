// ABOUTME: Public lifecycle operations for preview sandboxes
// ABOUTME: Composes the adapter and store behind a write-through in-memory cache

use crate::adapter::SandboxAdapter;
use crate::error::{Result, SandboxError};
use crate::storage::SandboxStore;
use crate::types::{
    CreateSandboxResponse, DeleteSandboxResponse, FileComparison, ProjectFile, SandboxRecord,
    SandboxStatus, UpdateReport,
};
use crate::validation::{validate_file_batch, validate_sandbox_id};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Shared cache of sandbox records, keyed by sandbox ID.
///
/// Strictly a read-through/write-through mirror of the store; never the
/// system of record. The cleanup scheduler holds the same handle so purged
/// records disappear from here too.
pub type SandboxCache = Arc<RwLock<HashMap<String, SandboxRecord>>>;

/// Orchestrates sandbox create/status/update/delete against the adapter,
/// persisting every state transition to the store.
#[derive(Clone)]
pub struct SandboxController {
    adapter: SandboxAdapter,
    store: SandboxStore,
    cache: SandboxCache,
}

impl SandboxController {
    pub fn new(adapter: SandboxAdapter, store: SandboxStore) -> Self {
        Self {
            adapter,
            store,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Handle to the shared cache, for the cleanup scheduler
    pub fn cache_handle(&self) -> SandboxCache {
        self.cache.clone()
    }

    /// Provision a new sandbox running the given files.
    ///
    /// This is the one operation where a failed state write propagates: a
    /// sandbox the store has never seen would be invisible to every cleanup
    /// policy except reconciliation.
    pub async fn create_sandbox(
        &self,
        files: &[ProjectFile],
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<CreateSandboxResponse> {
        validate_file_batch(files)?;

        let provisioned = self.adapter.create(files, project_id, user_id).await?;

        let mut record = SandboxRecord::running(
            provisioned.sandbox_id.clone(),
            self.adapter.config().sandbox_ttl,
        );
        record.preview_url = provisioned.preview_url.clone();
        record.preview_token = provisioned.preview_token.clone();
        record.project_id = project_id.map(str::to_string);
        record.user_id = user_id.map(str::to_string);

        self.store.upsert(&record).await?;
        self.cache
            .write()
            .await
            .insert(record.sandbox_id.clone(), record.clone());

        info!(
            "Sandbox {} running (preview: {:?})",
            record.sandbox_id, record.preview_url
        );

        Ok(CreateSandboxResponse {
            sandbox_id: record.sandbox_id,
            url: record.preview_url,
            token: record.preview_token,
            status: SandboxStatus::Running,
        })
    }

    /// Current state of a sandbox, refreshing its heartbeat.
    ///
    /// An uncached ID is probed against the provider: absent means NotFound;
    /// present means the sandbox survived a restart of this process, so a
    /// conservative error record is written rather than guessing running.
    pub async fn get_status(&self, sandbox_id: &str) -> Result<SandboxRecord> {
        validate_sandbox_id(sandbox_id)?;

        let cached = self.cache.read().await.get(sandbox_id).cloned();
        if let Some(mut record) = cached {
            let now = Utc::now();
            record.last_heartbeat_at = now;
            if let Err(e) = self.store.touch_heartbeat(sandbox_id, now).await {
                warn!("Heartbeat write for {} failed: {}", sandbox_id, e);
            }
            self.cache
                .write()
                .await
                .insert(sandbox_id.to_string(), record.clone());
            return Ok(record);
        }

        if !self.adapter.exists(sandbox_id).await {
            return Err(SandboxError::NotFound(sandbox_id.to_string()));
        }

        // The resource exists but this process has no state for it
        let mut record =
            SandboxRecord::running(sandbox_id, self.adapter.config().sandbox_ttl);
        record.status = SandboxStatus::Error;
        record.error = Some("Sandbox state unknown; rediscovered at the provider".to_string());

        if let Err(e) = self.store.upsert(&record).await {
            warn!("State write for rediscovered {} failed: {}", sandbox_id, e);
        }
        self.cache
            .write()
            .await
            .insert(sandbox_id.to_string(), record.clone());

        Ok(record)
    }

    /// Push changed files into a running sandbox.
    ///
    /// The cache must hold a running record and the remote resource must
    /// still exist; the cache is not trusted for the latter, so every call
    /// re-probes. The optional comparison is advisory telemetry only.
    pub async fn update_files(
        &self,
        sandbox_id: &str,
        files: &[ProjectFile],
        comparison: Option<FileComparison>,
    ) -> Result<UpdateReport> {
        validate_sandbox_id(sandbox_id)?;
        validate_file_batch(files)?;

        let cached = self.cache.read().await.get(sandbox_id).cloned();
        let record = cached.ok_or_else(|| {
            SandboxError::Precondition(format!("Sandbox {} is not tracked", sandbox_id))
        })?;
        if record.status != SandboxStatus::Running {
            return Err(SandboxError::Precondition(format!(
                "Sandbox {} is {}, not running",
                sandbox_id,
                record.status.as_str()
            )));
        }

        if !self.adapter.exists(sandbox_id).await {
            return Err(SandboxError::Precondition(format!(
                "Sandbox {} no longer exists at the provider",
                sandbox_id
            )));
        }

        if let Some(ref cmp) = comparison {
            debug!(
                "Update for {}: {} total, {} changed, {} skipped upstream",
                sandbox_id, cmp.total, cmp.changed, cmp.skipped
            );
        }

        let outcome = self.adapter.update(sandbox_id, files).await?;

        let now = Utc::now();
        if let Err(e) = self.store.touch_heartbeat(sandbox_id, now).await {
            warn!("Heartbeat write for {} failed: {}", sandbox_id, e);
        }
        if let Some(entry) = self.cache.write().await.get_mut(sandbox_id) {
            entry.last_heartbeat_at = now;
        }

        let message = format!(
            "Updated {}/{} files ({} rebuild)",
            outcome.updated,
            outcome.total,
            outcome.rebuild_action.as_str()
        );

        Ok(UpdateReport {
            updated_files: outcome.updated,
            total_files: outcome.total,
            skipped_files: comparison.map(|c| c.skipped).unwrap_or(0),
            errors: outcome.errors,
            rebuild_action: outcome.rebuild_action,
            message,
        })
    }

    /// Tear down a sandbox. Always records the stopped transition, whether or
    /// not the remote resource still existed; deleting twice is success.
    pub async fn delete_sandbox(&self, sandbox_id: &str) -> Result<DeleteSandboxResponse> {
        validate_sandbox_id(sandbox_id)?;

        let existed = self.adapter.delete(sandbox_id).await?;

        let now = Utc::now();
        let mut record = match self.cache.read().await.get(sandbox_id).cloned() {
            Some(record) => record,
            None => match self.store.get(sandbox_id).await {
                Ok(Some(record)) => record,
                _ => SandboxRecord::running(sandbox_id, self.adapter.config().sandbox_ttl),
            },
        };
        record.status = SandboxStatus::Stopped;
        record.error = None;
        record.last_heartbeat_at = now;

        if let Err(e) = self.store.upsert(&record).await {
            warn!("Stopped-state write for {} failed: {}", sandbox_id, e);
        }
        self.cache
            .write()
            .await
            .insert(sandbox_id.to_string(), record);

        info!("Sandbox {} stopped (existed: {})", sandbox_id, existed);
        Ok(DeleteSandboxResponse {
            success: true,
            existed,
        })
    }
}
