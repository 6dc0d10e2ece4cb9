// ABOUTME: SQLite storage for sandbox state records
// ABOUTME: Upsert-based persistence with monotonic heartbeats and purge queries for cleanup

use crate::error::Result;
use crate::types::{SandboxRecord, SandboxStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Storage interface for sandbox records.
///
/// Every mutation is a single-record upsert or delete; no multi-record
/// transactions are needed because each cleanup decision is independently
/// idempotent.
#[derive(Clone)]
pub struct SandboxStore {
    pool: SqlitePool,
}

impl SandboxStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the sandboxes table if it does not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sandboxes (
                sandbox_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                preview_url TEXT,
                preview_token TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                last_heartbeat_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                project_id TEXT,
                user_id TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or update a record by sandbox ID.
    ///
    /// On conflict, `created_at` is kept from the first observation, the
    /// heartbeat never moves backwards, and ownership fields are merged in
    /// rather than cleared.
    pub async fn upsert(&self, record: &SandboxRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sandboxes (
                sandbox_id, status, preview_url, preview_token, error_message,
                created_at, last_heartbeat_at, expires_at, project_id, user_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(sandbox_id) DO UPDATE SET
                status = excluded.status,
                preview_url = excluded.preview_url,
                preview_token = excluded.preview_token,
                error_message = excluded.error_message,
                last_heartbeat_at = MAX(sandboxes.last_heartbeat_at, excluded.last_heartbeat_at),
                expires_at = excluded.expires_at,
                project_id = COALESCE(excluded.project_id, sandboxes.project_id),
                user_id = COALESCE(excluded.user_id, sandboxes.user_id)
            "#,
        )
        .bind(&record.sandbox_id)
        .bind(record.status.as_str())
        .bind(&record.preview_url)
        .bind(&record.preview_token)
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.last_heartbeat_at)
        .bind(record.expires_at)
        .bind(&record.project_id)
        .bind(&record.user_id)
        .execute(&self.pool)
        .await?;

        debug!("Upserted sandbox record {}", record.sandbox_id);
        Ok(())
    }

    /// Get a record by sandbox ID
    pub async fn get(&self, sandbox_id: &str) -> Result<Option<SandboxRecord>> {
        let row = sqlx::query(
            r#"
            SELECT sandbox_id, status, preview_url, preview_token, error_message,
                   created_at, last_heartbeat_at, expires_at, project_id, user_id
            FROM sandboxes
            WHERE sandbox_id = ?
            "#,
        )
        .bind(sandbox_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_record))
    }

    /// List every tracked sandbox ID
    pub async fn all_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT sandbox_id FROM sandboxes ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.get("sandbox_id")).collect())
    }

    /// List records in a given status
    pub async fn list_by_status(&self, status: SandboxStatus) -> Result<Vec<SandboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT sandbox_id, status, preview_url, preview_token, error_message,
                   created_at, last_heartbeat_at, expires_at, project_id, user_id
            FROM sandboxes
            WHERE status = ?
            ORDER BY last_heartbeat_at ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Advance the heartbeat; a stale timestamp never moves it backwards
    pub async fn touch_heartbeat(&self, sandbox_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE sandboxes SET last_heartbeat_at = ? WHERE sandbox_id = ? AND last_heartbeat_at < ?",
        )
        .bind(at)
        .bind(sandbox_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set status and error message, touching the heartbeat as activity
    pub async fn set_status(
        &self,
        sandbox_id: &str,
        status: SandboxStatus,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sandboxes
            SET status = ?, error_message = ?,
                last_heartbeat_at = MAX(last_heartbeat_at, ?)
            WHERE sandbox_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .bind(sandbox_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a record; returns whether a row existed
    pub async fn delete(&self, sandbox_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sandboxes WHERE sandbox_id = ?")
            .bind(sandbox_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// IDs of records with no activity since the cutoff, regardless of status
    pub async fn ids_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT sandbox_id FROM sandboxes WHERE last_heartbeat_at < ?")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.get("sandbox_id")).collect())
    }

    /// IDs of records past their absolute expiry deadline
    pub async fn ids_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT sandbox_id FROM sandboxes WHERE expires_at < ?")
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.get("sandbox_id")).collect())
    }

    /// IDs of terminal-state records with no activity since the cutoff
    pub async fn ids_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT sandbox_id FROM sandboxes WHERE status IN ('stopped', 'error') AND last_heartbeat_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("sandbox_id")).collect())
    }

    /// Record counts grouped by status
    pub async fn status_counts(&self) -> Result<Vec<(SandboxStatus, usize)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM sandboxes GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let status: String = r.get("status");
                let count: i64 = r.get("count");
                (SandboxStatus::parse(&status), count as usize)
            })
            .collect())
    }

    /// Oldest heartbeat among records in the given statuses
    pub async fn oldest_heartbeat(
        &self,
        statuses: &[SandboxStatus],
    ) -> Result<Option<DateTime<Utc>>> {
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let query = format!(
            "SELECT MIN(last_heartbeat_at) AS oldest FROM sandboxes WHERE status IN ({})",
            placeholders
        );

        let mut q = sqlx::query(&query);
        for status in statuses {
            q = q.bind(status.as_str());
        }
        let row = q.fetch_one(&self.pool).await?;

        Ok(row.get::<Option<DateTime<Utc>>, _>("oldest"))
    }
}

fn row_to_record(row: &SqliteRow) -> SandboxRecord {
    let status: String = row.get("status");

    SandboxRecord {
        sandbox_id: row.get("sandbox_id"),
        status: SandboxStatus::parse(&status),
        preview_url: row.get("preview_url"),
        preview_token: row.get("preview_token"),
        error: row.get("error_message"),
        created_at: row.get("created_at"),
        last_heartbeat_at: row.get("last_heartbeat_at"),
        expires_at: row.get("expires_at"),
        project_id: row.get("project_id"),
        user_id: row.get("user_id"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_store;
    use chrono::Duration;

    fn record(id: &str) -> SandboxRecord {
        SandboxRecord::running(id, Duration::hours(1))
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = test_store().await;

        let mut rec = record("sbx-1");
        rec.preview_url = Some("https://5173-sbx-1.preview.test".to_string());
        rec.project_id = Some("proj-1".to_string());
        store.upsert(&rec).await.unwrap();

        let loaded = store.get("sbx-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, SandboxStatus::Running);
        assert_eq!(loaded.preview_url, rec.preview_url);
        assert_eq!(loaded.project_id.as_deref(), Some("proj-1"));

        assert!(store.get("sbx-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_merges_ownership_and_keeps_created_at() {
        let store = test_store().await;

        let mut first = record("sbx-1");
        first.project_id = Some("proj-1".to_string());
        store.upsert(&first).await.unwrap();

        // Second write with no ownership info must not clear it
        let mut second = record("sbx-1");
        second.status = SandboxStatus::Stopped;
        second.project_id = None;
        store.upsert(&second).await.unwrap();

        let loaded = store.get("sbx-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, SandboxStatus::Stopped);
        assert_eq!(loaded.project_id.as_deref(), Some("proj-1"));
        assert_eq!(loaded.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_heartbeat_is_monotonic() {
        let store = test_store().await;

        let rec = record("sbx-1");
        store.upsert(&rec).await.unwrap();

        let future = rec.last_heartbeat_at + Duration::minutes(5);
        store.touch_heartbeat("sbx-1", future).await.unwrap();

        // A stale touch must not move the heartbeat backwards
        let past = rec.last_heartbeat_at - Duration::minutes(5);
        store.touch_heartbeat("sbx-1", past).await.unwrap();

        let loaded = store.get("sbx-1").await.unwrap().unwrap();
        assert_eq!(loaded.last_heartbeat_at, future);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = test_store().await;
        store.upsert(&record("sbx-1")).await.unwrap();

        assert!(store.delete("sbx-1").await.unwrap());
        assert!(!store.delete("sbx-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_cutoffs() {
        let store = test_store().await;

        let mut old = record("sbx-old");
        old.last_heartbeat_at = Utc::now() - Duration::hours(30);
        store.upsert(&old).await.unwrap();

        let mut stopped = record("sbx-stopped");
        stopped.status = SandboxStatus::Stopped;
        stopped.last_heartbeat_at = Utc::now() - Duration::hours(3);
        store.upsert(&stopped).await.unwrap();

        let fresh = record("sbx-fresh");
        store.upsert(&fresh).await.unwrap();

        let expired = store
            .ids_inactive_before(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(expired, vec!["sbx-old".to_string()]);

        let terminal = store
            .ids_terminal_before(Utc::now() - Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(terminal, vec!["sbx-stopped".to_string()]);
    }

    #[tokio::test]
    async fn test_ids_expired_uses_absolute_deadline() {
        let store = test_store().await;

        let mut past_deadline = record("sbx-deadline");
        past_deadline.expires_at = Utc::now() - Duration::minutes(1);
        // Heartbeat is fresh; expiry must still catch it
        past_deadline.last_heartbeat_at = Utc::now();
        store.upsert(&past_deadline).await.unwrap();

        store.upsert(&record("sbx-alive")).await.unwrap();

        let expired = store.ids_expired(Utc::now()).await.unwrap();
        assert_eq!(expired, vec!["sbx-deadline".to_string()]);
    }

    #[tokio::test]
    async fn test_status_counts_and_oldest() {
        let store = test_store().await;

        store.upsert(&record("sbx-1")).await.unwrap();
        let mut stopped = record("sbx-2");
        stopped.status = SandboxStatus::Stopped;
        store.upsert(&stopped).await.unwrap();

        let counts = store.status_counts().await.unwrap();
        assert!(counts.contains(&(SandboxStatus::Running, 1)));
        assert!(counts.contains(&(SandboxStatus::Stopped, 1)));

        let oldest = store
            .oldest_heartbeat(&[SandboxStatus::Running])
            .await
            .unwrap();
        assert!(oldest.is_some());

        let none = store
            .oldest_heartbeat(&[SandboxStatus::Error])
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_records_survive_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("sandboxes.db").display()
        );

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        let store = SandboxStore::new(pool.clone());
        store.init_schema().await.unwrap();
        store.upsert(&record("sbx-1")).await.unwrap();
        pool.close().await;

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        let store = SandboxStore::new(pool);
        store.init_schema().await.unwrap();

        let loaded = store.get("sbx-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, SandboxStatus::Running);
    }

    #[tokio::test]
    async fn test_list_by_status_orders_by_heartbeat() {
        let store = test_store().await;

        let mut late = record("sbx-late");
        late.last_heartbeat_at = Utc::now();
        store.upsert(&late).await.unwrap();

        let mut early = record("sbx-early");
        early.last_heartbeat_at = Utc::now() - Duration::minutes(30);
        store.upsert(&early).await.unwrap();

        let running = store.list_by_status(SandboxStatus::Running).await.unwrap();
        assert_eq!(running.len(), 2);
        assert_eq!(running[0].sandbox_id, "sbx-early");
    }
}
