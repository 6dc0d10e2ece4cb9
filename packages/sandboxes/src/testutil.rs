// ABOUTME: Shared test doubles for the sandboxes package
// ABOUTME: In-memory Daytona fake, instant clock, and an in-memory sqlite store

use crate::adapter::Clock;
use crate::storage::SandboxStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skiff_daytona::{
    CreateSandboxRequest, DaytonaApi, DaytonaError, ExecResult, PreviewLink, RemoteSandbox,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory sqlite-backed store with the schema applied
pub async fn test_store() -> SandboxStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    let store = SandboxStore::new(pool);
    store.init_schema().await.expect("Failed to init schema");
    store
}

/// Clock whose sleeps return immediately; records total requested sleep time
pub struct FakeClock {
    slept: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            slept: Mutex::new(Duration::ZERO),
        }
    }

    pub fn total_slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        *self.slept.lock().unwrap() += duration;
    }
}

/// Stateful in-memory stand-in for the Daytona API.
///
/// Tracks live sandboxes, records every session command, and lets tests
/// script exec results by command substring.
pub struct FakeDaytona {
    sandboxes: Mutex<HashMap<String, RemoteSandbox>>,
    commands: Mutex<Vec<(String, String)>>,
    responders: Mutex<Vec<(String, ExecResult)>>,
    fail_lookups: AtomicBool,
    fail_deletes: AtomicBool,
    lookups: AtomicUsize,
    next_id: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeDaytona {
    pub fn new() -> Self {
        Self {
            sandboxes: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            responders: Mutex::new(Vec::new()),
            fail_lookups: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// Register a pre-existing sandbox and return its ID
    pub fn add_sandbox(&self) -> String {
        let id = format!("sbx-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sandboxes.lock().unwrap().insert(
            id.clone(),
            RemoteSandbox {
                id: id.clone(),
                state: Some("started".to_string()),
                labels: HashMap::new(),
                created_at: Some(Utc::now()),
            },
        );
        id
    }

    pub fn sandbox_ids(&self) -> Vec<String> {
        self.sandboxes.lock().unwrap().keys().cloned().collect()
    }

    pub fn commands_for(&self, sandbox_id: &str) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == sandbox_id)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    /// Script the exec result for any command containing the given substring.
    /// Responders are matched in registration order.
    pub fn respond_with(&self, command_substring: &str, result: ExecResult) {
        self.responders
            .lock()
            .unwrap()
            .push((command_substring.to_string(), result));
    }

    /// When set, `get_sandbox` fails with a server error instead of NotFound
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// When set, `delete_sandbox` fails with a server error
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// How many per-id `get_sandbox` probes were made
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DaytonaApi for FakeDaytona {
    async fn create_sandbox(
        &self,
        request: &CreateSandboxRequest,
    ) -> skiff_daytona::Result<RemoteSandbox> {
        let id = format!("sbx-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let sandbox = RemoteSandbox {
            id: id.clone(),
            state: Some("started".to_string()),
            labels: request.labels.clone(),
            created_at: Some(Utc::now()),
        };
        self.sandboxes
            .lock()
            .unwrap()
            .insert(id, sandbox.clone());
        Ok(sandbox)
    }

    async fn get_sandbox(&self, sandbox_id: &str) -> skiff_daytona::Result<RemoteSandbox> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(DaytonaError::Api {
                status: 500,
                message: "backend unavailable".to_string(),
            });
        }
        self.sandboxes
            .lock()
            .unwrap()
            .get(sandbox_id)
            .cloned()
            .ok_or_else(|| DaytonaError::NotFound(sandbox_id.to_string()))
    }

    async fn list_sandboxes(&self) -> skiff_daytona::Result<Vec<RemoteSandbox>> {
        Ok(self.sandboxes.lock().unwrap().values().cloned().collect())
    }

    async fn delete_sandbox(&self, sandbox_id: &str) -> skiff_daytona::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(DaytonaError::Api {
                status: 500,
                message: "backend unavailable".to_string(),
            });
        }
        match self.sandboxes.lock().unwrap().remove(sandbox_id) {
            Some(_) => {
                self.deleted.lock().unwrap().push(sandbox_id.to_string());
                Ok(())
            }
            None => Err(DaytonaError::NotFound(sandbox_id.to_string())),
        }
    }

    async fn create_session(&self, sandbox_id: &str, _session_id: &str) -> skiff_daytona::Result<()> {
        if self.sandboxes.lock().unwrap().contains_key(sandbox_id) {
            Ok(())
        } else {
            Err(DaytonaError::NotFound(sandbox_id.to_string()))
        }
    }

    async fn delete_session(&self, _sandbox_id: &str, _session_id: &str) -> skiff_daytona::Result<()> {
        Ok(())
    }

    async fn exec(
        &self,
        sandbox_id: &str,
        _session_id: &str,
        command: &str,
    ) -> skiff_daytona::Result<ExecResult> {
        self.commands
            .lock()
            .unwrap()
            .push((sandbox_id.to_string(), command.to_string()));

        let responders = self.responders.lock().unwrap();
        for (substring, result) in responders.iter() {
            if command.contains(substring.as_str()) {
                return Ok(result.clone());
            }
        }
        Ok(ExecResult {
            exit_code: 0,
            output: String::new(),
        })
    }

    async fn preview_link(
        &self,
        sandbox_id: &str,
        port: u16,
    ) -> skiff_daytona::Result<PreviewLink> {
        if !self.sandboxes.lock().unwrap().contains_key(sandbox_id) {
            return Err(DaytonaError::NotFound(sandbox_id.to_string()));
        }
        Ok(PreviewLink {
            url: format!("https://{}-{}.preview.test", port, sandbox_id),
            token: Some(format!("token-{}", sandbox_id)),
        })
    }
}
