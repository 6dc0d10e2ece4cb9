// ABOUTME: Background cleanup scheduler for preview sandboxes
// ABOUTME: Expired purge, idle reclamation, stopped-record purge, and provider reconciliation

use crate::adapter::SandboxAdapter;
use crate::config::CleanupConfig;
use crate::controller::SandboxCache;
use crate::error::Result;
use crate::storage::SandboxStore;
use crate::types::{CleanupAction, CleanupStats, ControlOutcome, SandboxStatus};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Periodic reclamation of sandbox records and their remote resources.
///
/// Three independent policies run on their own timers:
/// - expired purge: records past their absolute deadline or older than the
///   hard age ceiling are torn down and forgotten
/// - idle reclamation: running sandboxes with a stale heartbeat are stopped
/// - stopped purge: terminal-state records are dropped after their
///   retention window
///
/// Every pass is idempotent, so a crash mid-pass just means the next tick
/// finishes the job. The service shares the controller's cache handle and
/// evicts whatever it purges.
#[derive(Clone)]
pub struct CleanupService {
    adapter: SandboxAdapter,
    store: SandboxStore,
    cache: SandboxCache,
    config: CleanupConfig,
    running: Arc<AtomicBool>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    last_idle_sweep: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl CleanupService {
    pub fn new(
        adapter: SandboxAdapter,
        store: SandboxStore,
        cache: SandboxCache,
        config: CleanupConfig,
    ) -> Self {
        Self {
            adapter,
            store,
            cache,
            config,
            running: Arc::new(AtomicBool::new(false)),
            tasks: Arc::new(Mutex::new(Vec::new())),
            last_idle_sweep: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the scheduler loops, stopping any previous instance first.
    /// Returns false when an already-running scheduler was replaced.
    pub fn start(&self) -> bool {
        let fresh = !self.stop();
        self.running.store(true, Ordering::SeqCst);

        info!(
            "Starting cleanup scheduler (expired every {:?}, idle every {:?}, stopped every {:?})",
            self.config.expired_purge_interval,
            self.config.idle_sweep_interval,
            self.config.stopped_purge_interval
        );

        let mut tasks = self.tasks.lock().unwrap();

        // Reconcile once at start; records orphaned while the scheduler was
        // down must not wait for an operator
        let svc = self.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = svc.sync_with_daytona().await {
                warn!("Startup reconciliation failed: {}", e);
            }
        }));

        let svc = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(svc.config.expired_purge_interval);
            ticker.tick().await;
            while svc.is_running() {
                ticker.tick().await;
                if let Err(e) = svc.run_expired_purge().await {
                    warn!("Expired purge failed: {}", e);
                }
            }
        }));

        let svc = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(svc.config.idle_sweep_interval);
            ticker.tick().await;
            while svc.is_running() {
                ticker.tick().await;
                if let Err(e) = svc.run_idle_sweep(false).await {
                    warn!("Idle sweep failed: {}", e);
                }
            }
        }));

        let svc = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(svc.config.stopped_purge_interval);
            ticker.tick().await;
            while svc.is_running() {
                ticker.tick().await;
                if let Err(e) = svc.run_stopped_purge().await {
                    warn!("Stopped purge failed: {}", e);
                }
            }
        }));

        fresh
    }

    /// Stop the scheduler loops. Stopping twice is a no-op.
    pub fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }

        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        info!("Cleanup scheduler stopped");
        true
    }

    /// Purge records past their absolute deadline or the hard age ceiling.
    ///
    /// The remote resource is deleted first (already-gone is fine), then the
    /// record is dropped from the store and cache. Returns how many records
    /// were purged.
    pub async fn run_expired_purge(&self) -> Result<usize> {
        let now = Utc::now();
        let mut ids = self.store.ids_expired(now).await?;
        for id in self
            .store
            .ids_inactive_before(now - self.config.max_sandbox_age)
            .await?
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let mut purged = 0;
        for id in ids {
            if let Err(e) = self.adapter.delete(&id).await {
                warn!("Expired purge could not delete {}: {}", id, e);
                self.mark_error(&id, &e.to_string()).await?;
                continue;
            }
            self.store.delete(&id).await?;
            self.cache.write().await.remove(&id);
            purged += 1;
            info!("Purged expired sandbox {}", id);
        }

        Ok(purged)
    }

    /// Stop running sandboxes whose heartbeat went stale.
    ///
    /// A cooldown guards against overlapping sweeps; a forced sweep (from the
    /// control surface) skips it. The pass bails out early when the provider
    /// reports no live sandboxes at all. A reclaimed sandbox keeps a stopped
    /// record so the stopped purge retires it later; a record whose remote is
    /// already gone is dropped outright. Returns how many records changed.
    pub async fn run_idle_sweep(&self, force: bool) -> Result<usize> {
        let now = Utc::now();

        if !force {
            let last = *self.last_idle_sweep.lock().unwrap();
            if let Some(last) = last {
                let since = now - last;
                if since < chrono::Duration::from_std(self.config.idle_sweep_cooldown).unwrap_or_default()
                {
                    debug!("Idle sweep skipped, last ran {}s ago", since.num_seconds());
                    return Ok(0);
                }
            }
        }
        *self.last_idle_sweep.lock().unwrap() = Some(now);

        match self.adapter.list_ids().await {
            Ok(live) if live.is_empty() => {
                debug!("Idle sweep skipped, provider reports no live sandboxes");
                return Ok(0);
            }
            Ok(_) => {}
            Err(e) => warn!("Live sandbox listing failed, sweeping anyway: {}", e),
        }

        let cutoff = now - self.config.idle_threshold;
        let mut reclaimed = 0;
        for record in self.store.list_by_status(SandboxStatus::Running).await? {
            if record.last_heartbeat_at >= cutoff {
                // Ordered by heartbeat, so nothing later is idle either
                break;
            }

            let id = record.sandbox_id;
            match self.adapter.delete(&id).await {
                Ok(true) => {
                    self.store.set_status(&id, SandboxStatus::Stopped, None).await?;
                    if let Some(entry) = self.cache.write().await.get_mut(&id) {
                        entry.status = SandboxStatus::Stopped;
                        entry.error = None;
                    }
                    reclaimed += 1;
                    info!(
                        "Reclaimed idle sandbox {} (last heartbeat {})",
                        id, record.last_heartbeat_at
                    );
                }
                Ok(false) => {
                    // No remote counterpart; the record itself is the orphan
                    self.store.delete(&id).await?;
                    self.cache.write().await.remove(&id);
                    reclaimed += 1;
                    info!("Dropped orphan record {} during idle sweep", id);
                }
                Err(e) => {
                    warn!("Idle sweep could not delete {}: {}", id, e);
                    self.mark_error(&id, &e.to_string()).await?;
                }
            }
        }

        Ok(reclaimed)
    }

    /// Record a per-sandbox cleanup failure so it is visible on status reads
    async fn mark_error(&self, sandbox_id: &str, message: &str) -> Result<()> {
        self.store
            .set_status(sandbox_id, SandboxStatus::Error, Some(message))
            .await?;
        if let Some(entry) = self.cache.write().await.get_mut(sandbox_id) {
            entry.status = SandboxStatus::Error;
            entry.error = Some(message.to_string());
        }
        Ok(())
    }

    /// Drop terminal-state records past their retention window
    pub async fn run_stopped_purge(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.config.stopped_retention;
        let ids = self.store.ids_terminal_before(cutoff).await?;

        let mut purged = 0;
        for id in ids {
            self.store.delete(&id).await?;
            self.cache.write().await.remove(&id);
            purged += 1;
            debug!("Retired stopped sandbox record {}", id);
        }

        if purged > 0 {
            info!("Retired {} stopped sandbox records", purged);
        }
        Ok(purged)
    }

    /// Reconcile persisted records against the provider.
    ///
    /// A non-terminal record whose remote resource no longer exists is an
    /// orphan and is deleted from the store and cache. Terminal records are
    /// left for the stopped purge, which owns their retention window.
    /// Returns how many records were removed.
    pub async fn sync_with_daytona(&self) -> Result<usize> {
        let mut reconciled = 0;
        for id in self.store.all_ids().await? {
            let record = match self.store.get(&id).await? {
                Some(record) => record,
                None => continue,
            };
            if record.status.is_terminal() {
                continue;
            }

            if !self.adapter.exists(&id).await {
                self.store.delete(&id).await?;
                self.cache.write().await.remove(&id);
                reconciled += 1;
                info!("Reconciled {}: remote sandbox is gone, record removed", id);
            }
        }

        Ok(reconciled)
    }

    /// Aggregate counts and ages for the stats surface
    pub async fn stats(&self) -> Result<CleanupStats> {
        let now = Utc::now();
        let mut stats = CleanupStats {
            scheduler_running: self.is_running(),
            last_idle_sweep_at: *self.last_idle_sweep.lock().unwrap(),
            ..Default::default()
        };

        for (status, count) in self.store.status_counts().await? {
            match status {
                SandboxStatus::Creating => stats.creating = count,
                SandboxStatus::Running => stats.running = count,
                SandboxStatus::Stopped => stats.stopped = count,
                SandboxStatus::Error => stats.error = count,
            }
            stats.total += count;
        }

        stats.oldest_running_age_secs = self
            .store
            .oldest_heartbeat(&[SandboxStatus::Running])
            .await?
            .map(|t| (now - t).num_seconds());
        stats.oldest_stopped_age_secs = self
            .store
            .oldest_heartbeat(&[SandboxStatus::Stopped, SandboxStatus::Error])
            .await?
            .map(|t| (now - t).num_seconds());

        Ok(stats)
    }

    /// Control surface: start/stop the scheduler or run one pass immediately
    pub async fn control(&self, action: CleanupAction) -> ControlOutcome {
        let result: Result<String> = match action {
            CleanupAction::Start => Ok(if self.start() {
                "Cleanup scheduler started".to_string()
            } else {
                "Cleanup scheduler restarted".to_string()
            }),
            CleanupAction::Stop => Ok(if self.stop() {
                "Cleanup scheduler stopped".to_string()
            } else {
                "Cleanup scheduler was not running".to_string()
            }),
            CleanupAction::Cleanup => self
                .run_expired_purge()
                .await
                .map(|n| format!("Purged {} expired sandboxes", n)),
            CleanupAction::Sync => self
                .sync_with_daytona()
                .await
                .map(|n| format!("Reconciled {} sandbox records", n)),
            CleanupAction::Memory => self
                .run_idle_sweep(true)
                .await
                .map(|n| format!("Reclaimed {} idle sandboxes", n)),
            CleanupAction::Stopped => self
                .run_stopped_purge()
                .await
                .map(|n| format!("Retired {} stopped sandbox records", n)),
        };

        match result {
            Ok(message) => ControlOutcome {
                success: true,
                message,
                stats: self.stats().await.ok(),
            },
            Err(e) => ControlOutcome {
                success: false,
                message: e.to_string(),
                stats: None,
            },
        }
    }
}
