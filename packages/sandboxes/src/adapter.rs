// ABOUTME: Remote sandbox adapter over the Daytona API
// ABOUTME: Provisions a sandbox running a file set, with readiness probing and rollback on failure

use crate::config::{
    AdapterConfig, MANAGED_LABEL, PROJECT_LABEL, REACT_PLUGIN, REACT_PLUGIN_VERSION,
    REACT_SWC_PLUGIN, USER_LABEL,
};
use crate::error::{Result, SandboxError};
use crate::sync;
use crate::types::{ProjectFile, RebuildAction};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::json;
use skiff_daytona::{CreateSandboxRequest, DaytonaApi};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Clock/sleep abstraction so readiness polling is testable without wall-clock delays
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by tokio timers
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A sandbox the adapter has brought up and health-checked
#[derive(Debug, Clone)]
pub struct ProvisionedSandbox {
    pub sandbox_id: String,
    pub preview_url: Option<String>,
    pub preview_token: Option<String>,
}

/// Report from an adapter-level file update
#[derive(Debug)]
pub struct UpdateOutcome {
    pub updated: usize,
    pub total: usize,
    pub errors: Vec<String>,
    pub rebuild_action: RebuildAction,
}

/// Thin but stateful wrapper around the provisioning API.
///
/// Translates "run these files in a sandbox" into the create/push/install/
/// start/probe sequence, and guarantees the sandbox is observably ready (or at
/// least alive) before returning success.
#[derive(Clone)]
pub struct SandboxAdapter {
    api: Arc<dyn DaytonaApi>,
    clock: Arc<dyn Clock>,
    config: AdapterConfig,
}

impl SandboxAdapter {
    pub fn new(api: Arc<dyn DaytonaApi>, config: AdapterConfig) -> Self {
        Self::with_clock(api, config, Arc::new(TokioClock))
    }

    pub fn with_clock(
        api: Arc<dyn DaytonaApi>,
        config: AdapterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { api, clock, config }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Create a sandbox running the given file set.
    ///
    /// On any failure after the remote sandbox object exists, the partial
    /// sandbox is best-effort deleted before the error propagates, so a known
    /// failure path never leaves an unreachable billable resource behind.
    pub async fn create(
        &self,
        files: &[ProjectFile],
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<ProvisionedSandbox> {
        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        if let Some(project) = project_id {
            labels.insert(PROJECT_LABEL.to_string(), project.to_string());
        }
        if let Some(user) = user_id {
            labels.insert(USER_LABEL.to_string(), user.to_string());
        }

        let ttl_minutes = self.config.sandbox_ttl.num_minutes().max(1) as u32;
        let request = CreateSandboxRequest {
            snapshot: self.config.snapshot.clone(),
            labels,
            auto_stop_interval: Some(ttl_minutes),
            auto_delete_interval: Some(ttl_minutes),
        };

        let remote = self
            .api
            .create_sandbox(&request)
            .await
            .map_err(|e| SandboxError::Provisioning(format!("create failed: {}", e)))?;
        let sandbox_id = remote.id.clone();
        info!("Created sandbox {}", sandbox_id);

        match self.provision(&sandbox_id, files).await {
            Ok(provisioned) => Ok(provisioned),
            Err(e) => {
                warn!(
                    "Provisioning sandbox {} failed, rolling back: {}",
                    sandbox_id, e
                );
                if let Err(delete_err) = self.api.delete_sandbox(&sandbox_id).await {
                    warn!(
                        "Rollback delete of sandbox {} failed: {}",
                        sandbox_id, delete_err
                    );
                }
                Err(e)
            }
        }
    }

    /// The sequential bring-up pipeline; any stage error triggers the caller's rollback
    async fn provision(
        &self,
        sandbox_id: &str,
        files: &[ProjectFile],
    ) -> Result<ProvisionedSandbox> {
        let session = format!("skiff-setup-{}", Uuid::new_v4());
        self.api
            .create_session(sandbox_id, &session)
            .await
            .map_err(|e| SandboxError::Provisioning(format!("session failed: {}", e)))?;

        let result = self.provision_in_session(sandbox_id, &session, files).await;

        if let Err(e) = self.api.delete_session(sandbox_id, &session).await {
            debug!("Failed to close setup session on {}: {}", sandbox_id, e);
        }

        result
    }

    async fn provision_in_session(
        &self,
        sandbox_id: &str,
        session: &str,
        files: &[ProjectFile],
    ) -> Result<ProvisionedSandbox> {
        let report = sync::push_files(
            &*self.api,
            sandbox_id,
            session,
            &self.config.workdir,
            files,
        )
        .await;
        if !report.errors.is_empty() {
            warn!(
                "Initial file push into {} had {} failures: {:?}",
                sandbox_id,
                report.errors.len(),
                report.errors
            );
        }

        self.fix_dependency_manifest(sandbox_id, session).await?;
        self.install_dependencies(sandbox_id, session).await?;
        self.start_dev_server(sandbox_id, session).await?;

        let ready = self.wait_for_ready(sandbox_id, session).await?;
        if !ready {
            // Soft readiness: the caller heartbeats later and retries
            warn!(
                "Sandbox {} never answered on port {}, continuing anyway",
                sandbox_id, self.config.dev_port
            );
        }

        let (preview_url, preview_token) =
            match self.api.preview_link(sandbox_id, self.config.dev_port).await {
                Ok(link) => (Some(link.url), link.token),
                Err(e) => {
                    warn!("Preview link lookup for {} failed: {}", sandbox_id, e);
                    (None, None)
                }
            };

        Ok(ProvisionedSandbox {
            sandbox_id: sandbox_id.to_string(),
            preview_url,
            preview_token,
        })
    }

    /// Two fix-up steps against the generated dependency manifest: pin the
    /// React plugin version and drop the conflicting SWC variant.
    async fn fix_dependency_manifest(&self, sandbox_id: &str, session: &str) -> Result<()> {
        let manifest_path = format!("{}/package.json", self.config.workdir);
        let cat = self
            .api
            .exec(sandbox_id, session, &format!("cat '{}'", manifest_path))
            .await
            .map_err(|e| SandboxError::Provisioning(format!("manifest read failed: {}", e)))?;
        if !cat.succeeded() {
            warn!("No dependency manifest in {}, skipping fix-ups", sandbox_id);
            return Ok(());
        }

        let mut manifest: serde_json::Value = match serde_json::from_str(&cat.output) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unparseable manifest in {}: {}", sandbox_id, e);
                return Ok(());
            }
        };

        let mut changed = false;
        if let Some(deps) = manifest
            .get_mut("devDependencies")
            .and_then(|v| v.as_object_mut())
        {
            if deps.get(REACT_PLUGIN).and_then(|v| v.as_str()) != Some(REACT_PLUGIN_VERSION) {
                deps.insert(REACT_PLUGIN.to_string(), json!(REACT_PLUGIN_VERSION));
                changed = true;
            }
            if deps.remove(REACT_SWC_PLUGIN).is_some() {
                changed = true;
            }
        }

        if changed {
            let payload = BASE64.encode(serde_json::to_string_pretty(&manifest)?.as_bytes());
            let write = format!("echo '{}' | base64 -d > '{}'", payload, manifest_path);
            let result = self
                .api
                .exec(sandbox_id, session, &write)
                .await
                .map_err(|e| SandboxError::Provisioning(format!("manifest write failed: {}", e)))?;
            if !result.succeeded() {
                return Err(SandboxError::Provisioning(format!(
                    "manifest write exited with code {}",
                    result.exit_code
                )));
            }
            debug!("Pinned {} in {}", REACT_PLUGIN, sandbox_id);
        }

        Ok(())
    }

    async fn install_dependencies(&self, sandbox_id: &str, session: &str) -> Result<()> {
        let command = format!(
            "cd '{}' && pnpm install --prefer-offline 2>&1 | tail -5",
            self.config.workdir
        );
        let result = self
            .api
            .exec(sandbox_id, session, &command)
            .await
            .map_err(|e| SandboxError::Provisioning(format!("install failed: {}", e)))?;
        if !result.succeeded() {
            return Err(SandboxError::Provisioning(format!(
                "dependency install exited with code {}: {}",
                result.exit_code,
                result.output.trim()
            )));
        }
        Ok(())
    }

    async fn start_dev_server(&self, sandbox_id: &str, session: &str) -> Result<()> {
        let command = format!(
            "cd '{}' && nohup pnpm run dev -- --host 0.0.0.0 --port {} > /tmp/dev-server.log 2>&1 &",
            self.config.workdir, self.config.dev_port
        );
        self.api
            .exec(sandbox_id, session, &command)
            .await
            .map_err(|e| SandboxError::Provisioning(format!("dev server start failed: {}", e)))?;

        self.clock.sleep(self.config.server_start_delay).await;
        Ok(())
    }

    /// Poll until the dev server is serving: first the port must bind, then an
    /// HTTP probe must answer with 2xx or 4xx. Redirects and 5xx do not count.
    /// Returns Ok(false) when the attempts run out; that is soft, not fatal.
    async fn wait_for_ready(&self, sandbox_id: &str, session: &str) -> Result<bool> {
        let port = self.config.dev_port;

        let mut port_bound = false;
        for _ in 0..self.config.max_ready_attempts {
            let probe = format!("ss -ltn | grep -q ':{}'", port);
            if let Ok(result) = self.api.exec(sandbox_id, session, &probe).await {
                if result.succeeded() {
                    port_bound = true;
                    break;
                }
            }
            self.clock.sleep(self.config.ready_poll_interval).await;
        }
        if !port_bound {
            return Ok(false);
        }

        for _ in 0..self.config.max_ready_attempts {
            let probe = format!(
                "curl -s -o /dev/null -w '%{{http_code}}' http://localhost:{}",
                port
            );
            if let Ok(result) = self.api.exec(sandbox_id, session, &probe).await {
                if result.succeeded() {
                    if let Ok(code) = result.output.trim().parse::<u16>() {
                        if (200..300).contains(&code) || (400..500).contains(&code) {
                            debug!("Sandbox {} ready (HTTP {})", sandbox_id, code);
                            return Ok(true);
                        }
                    }
                }
            }
            self.clock.sleep(self.config.ready_poll_interval).await;
        }

        Ok(false)
    }

    /// Push a file batch into an existing sandbox and trigger the matching rebuild
    pub async fn update(&self, sandbox_id: &str, files: &[ProjectFile]) -> Result<UpdateOutcome> {
        self.api
            .get_sandbox(sandbox_id)
            .await
            .map_err(|e| match e {
                skiff_daytona::DaytonaError::NotFound(id) => SandboxError::NotFound(id),
                other => SandboxError::Provisioning(format!("lookup failed: {}", other)),
            })?;

        let rebuild_action = sync::classify_rebuild(files);

        let session = format!("skiff-update-{}", Uuid::new_v4());
        self.api
            .create_session(sandbox_id, &session)
            .await
            .map_err(|e| SandboxError::Provisioning(format!("session failed: {}", e)))?;

        let report = sync::push_files(
            &*self.api,
            sandbox_id,
            &session,
            &self.config.workdir,
            files,
        )
        .await;

        if let Err(e) = self.trigger_rebuild(sandbox_id, &session, rebuild_action).await {
            warn!("Rebuild trigger for {} failed: {}", sandbox_id, e);
        }

        if let Err(e) = self.api.delete_session(sandbox_id, &session).await {
            debug!("Failed to close update session on {}: {}", sandbox_id, e);
        }

        Ok(UpdateOutcome {
            updated: report.written,
            total: files.len(),
            errors: report.errors,
            rebuild_action,
        })
    }

    /// Full and optimized rebuilds share the restart trigger; full also
    /// reinstalls because the dependency manifest changed. Style-only changes
    /// hot-reload without any trigger.
    async fn trigger_rebuild(
        &self,
        sandbox_id: &str,
        session: &str,
        action: RebuildAction,
    ) -> Result<()> {
        match action {
            RebuildAction::Full => {
                self.install_dependencies(sandbox_id, session).await?;
                self.restart_dev_server(sandbox_id, session).await
            }
            RebuildAction::Optimized => self.restart_dev_server(sandbox_id, session).await,
            RebuildAction::StyleOnly | RebuildAction::None => Ok(()),
        }
    }

    async fn restart_dev_server(&self, sandbox_id: &str, session: &str) -> Result<()> {
        let kill = format!("pkill -f 'vite.*{}' || true", self.config.dev_port);
        self.api
            .exec(sandbox_id, session, &kill)
            .await
            .map_err(|e| SandboxError::Provisioning(format!("dev server stop failed: {}", e)))?;
        self.start_dev_server(sandbox_id, session).await
    }

    /// IDs of all sandboxes currently live at the provider
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let sandboxes = self
            .api
            .list_sandboxes()
            .await
            .map_err(|e| SandboxError::Provisioning(format!("list failed: {}", e)))?;
        Ok(sandboxes.into_iter().map(|s| s.id).collect())
    }

    /// Delete a sandbox; deleting an already-gone sandbox is success.
    /// Returns whether the remote resource existed.
    pub async fn delete(&self, sandbox_id: &str) -> Result<bool> {
        if !self.exists(sandbox_id).await {
            debug!("Sandbox {} already gone", sandbox_id);
            return Ok(false);
        }

        match self.api.delete_sandbox(sandbox_id).await {
            Ok(()) => {
                info!("Deleted sandbox {}", sandbox_id);
                Ok(true)
            }
            // Lost a race with the provider's own reclamation; still success
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(SandboxError::Provisioning(format!("delete failed: {}", e))),
        }
    }

    /// Existence probe. Lookup errors count as absent, never as a thrown
    /// error, because callers feed this into reconciliation decisions.
    pub async fn exists(&self, sandbox_id: &str) -> bool {
        match self.api.get_sandbox(sandbox_id).await {
            Ok(_) => true,
            Err(e) => {
                if !e.is_not_found() {
                    debug!("Existence probe for {} failed: {}", sandbox_id, e);
                }
                false
            }
        }
    }
}
