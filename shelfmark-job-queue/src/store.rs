//! Durable job store backed by the shared SQLite database.

use shelfmark_db::{now_rfc3339, DbPool};
use sqlx::types::Uuid;

use crate::error::JobStoreError;
use crate::events::SharedEventSink;
use crate::types::{Job, JobStatus};

const JOB_COLUMNS: &str = "id, type, status, entry_id, payload_json, attempts, locked_at, \
     finished_at, last_error, last_response, created_at";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    job_type: String,
    status: String,
    entry_id: Uuid,
    payload_json: Option<String>,
    attempts: i64,
    locked_at: Option<String>,
    finished_at: Option<String>,
    last_error: Option<String>,
    last_response: Option<String>,
    created_at: String,
}

impl JobRow {
    fn into_job(self) -> Result<Job, JobStoreError> {
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| JobStoreError::CorruptStatus(self.status.clone()))?;
        Ok(Job {
            id: self.id,
            job_type: self.job_type,
            status,
            entry_id: self.entry_id,
            payload_json: self.payload_json,
            attempts: self.attempts,
            locked_at: self.locked_at,
            finished_at: self.finished_at,
            last_error: self.last_error,
            last_response: self.last_response,
            created_at: self.created_at,
        })
    }
}

/// Durable store of job records.
///
/// All mutations are single-row conditional updates, so multiple workers can
/// share the store with no locking beyond what SQLite itself provides. Each
/// mutation publishes the job's fresh snapshot to the injected event sink.
#[derive(Clone)]
pub struct JobStore {
    pool: DbPool,
    events: SharedEventSink,
}

impl JobStore {
    pub fn new(pool: DbPool, events: SharedEventSink) -> Self {
        Self { pool, events }
    }

    /// Insert a new PENDING job. No dedup is attempted; callers are
    /// responsible for not enqueueing redundant work.
    pub async fn enqueue(
        &self,
        job_type: &str,
        entry_id: Uuid,
        payload: Option<&serde_json::Value>,
    ) -> Result<Job, JobStoreError> {
        let id = Uuid::new_v4();
        let now = now_rfc3339();
        let payload_json = payload.map(|v| v.to_string());

        sqlx::query(
            "INSERT INTO jobs (id, type, status, entry_id, payload_json, attempts, locked_at, \
             finished_at, last_error, last_response, created_at) \
             VALUES (?, ?, 'PENDING', ?, ?, 0, NULL, NULL, NULL, NULL, ?)",
        )
        .bind(id)
        .bind(job_type)
        .bind(entry_id)
        .bind(&payload_json)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let job = Job {
            id,
            job_type: job_type.to_string(),
            status: JobStatus::Pending,
            entry_id,
            payload_json,
            attempts: 0,
            locked_at: None,
            finished_at: None,
            last_error: None,
            last_response: None,
            created_at: now,
        };
        self.publish(&job);
        Ok(job)
    }

    /// Claim exactly one pending job by setting it RUNNING in a single
    /// conditional UPDATE. Safe under concurrent callers: the statement
    /// changes at most one row, so no two claimers can receive the same job.
    pub async fn claim_next_pending(&self) -> Result<Option<Job>, JobStoreError> {
        let now = now_rfc3339();
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs \
             SET status = 'RUNNING', locked_at = ?, attempts = attempts + 1 \
             WHERE id = ( \
               SELECT id FROM jobs \
               WHERE status = 'PENDING' \
               ORDER BY created_at ASC, id ASC \
               LIMIT 1 \
             ) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let job = row.into_job()?;
        self.publish(&job);
        Ok(Some(job))
    }

    /// Terminal success. Also deletes older FAILED jobs of the same
    /// `(entry_id, type)` pair; queue hygiene, not a correctness requirement.
    pub async fn mark_succeeded(
        &self,
        job_id: Uuid,
        last_response: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs \
             SET status = 'SUCCEEDED', finished_at = ?, locked_at = NULL, last_response = ? \
             WHERE id = ? \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now_rfc3339())
        .bind(last_response)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(());
        };
        let job = row.into_job()?;

        sqlx::query(
            "DELETE FROM jobs WHERE entry_id = ? AND type = ? AND status = 'FAILED' AND id != ?",
        )
        .bind(job.entry_id)
        .bind(&job.job_type)
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        self.publish(&job);
        Ok(())
    }

    /// Record a failure. With `retry` the job goes back to PENDING and keeps
    /// its attempt count (the claim already charged this attempt); without it
    /// the job is terminal FAILED.
    pub async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        last_response: Option<&str>,
        retry: bool,
    ) -> Result<(), JobStoreError> {
        let row: Option<JobRow> = if retry {
            sqlx::query_as(&format!(
                "UPDATE jobs \
                 SET status = 'PENDING', last_error = ?, last_response = ?, locked_at = NULL \
                 WHERE id = ? \
                 RETURNING {JOB_COLUMNS}"
            ))
            .bind(error)
            .bind(last_response)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_as(&format!(
                "UPDATE jobs \
                 SET status = 'FAILED', last_error = ?, last_response = ?, locked_at = NULL, \
                     finished_at = ? \
                 WHERE id = ? \
                 RETURNING {JOB_COLUMNS}"
            ))
            .bind(error)
            .bind(last_response)
            .bind(now_rfc3339())
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
        };

        if let Some(row) = row {
            self.publish(&row.into_job()?);
        }
        Ok(())
    }

    /// Cancel a job only while it is still PENDING. Returns affected rows
    /// (0 means not found or not pending).
    pub async fn cancel_pending(&self, job_id: Uuid) -> Result<u64, JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs \
             SET status = 'CANCELLED', finished_at = ?, locked_at = NULL, last_error = NULL \
             WHERE id = ? AND status = 'PENDING' \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now_rfc3339())
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                self.publish(&row.into_job()?);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    /// Revive a FAILED or CANCELLED job: back to PENDING with a fresh attempt
    /// budget. Returns affected rows.
    pub async fn retry(&self, job_id: Uuid) -> Result<u64, JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "UPDATE jobs \
             SET status = 'PENDING', attempts = 0, finished_at = NULL, locked_at = NULL \
             WHERE id = ? AND status IN ('FAILED', 'CANCELLED') \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                self.publish(&row.into_job()?);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    /// Delete a job record unless it is currently RUNNING. Returns deleted
    /// rows.
    pub async fn delete_if_not_running(&self, job_id: Uuid) -> Result<u64, JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "DELETE FROM jobs WHERE id = ? AND status != 'RUNNING' RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                self.publish(&row.into_job()?);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    pub async fn get_by_id(&self, job_id: Uuid) -> Result<Option<Job>, JobStoreError> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(JobRow::into_job).transpose()
    }

    /// Read-only query for observability. Filters are optional; results are
    /// in creation order.
    pub async fn list(
        &self,
        entry_id: Option<Uuid>,
        statuses: &[JobStatus],
        limit: i64,
    ) -> Result<Vec<Job>, JobStoreError> {
        let mut clauses: Vec<String> = Vec::new();
        if entry_id.is_some() {
            clauses.push("entry_id = ?".to_string());
        }
        if !statuses.is_empty() {
            let placeholders = vec!["?"; statuses.len()].join(", ");
            clauses.push(format!("status IN ({placeholders})"));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs {where_sql} ORDER BY created_at ASC, id ASC LIMIT ?"
        );

        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        if let Some(entry_id) = entry_id {
            query = query.bind(entry_id);
        }
        for status in statuses {
            query = query.bind(status.as_str());
        }
        query = query.bind(limit.max(1));

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// For each given entry, report it if the most recent job of any type is
    /// FAILED. Used by the presentation layer to flag entries needing
    /// attention.
    pub async fn find_entry_ids_with_failed_latest_job(
        &self,
        entry_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, JobStoreError> {
        if entry_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; entry_ids.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT j.entry_id FROM jobs j \
             WHERE j.entry_id IN ({placeholders}) \
               AND j.status = 'FAILED' \
               AND j.created_at = ( \
                 SELECT MAX(j2.created_at) FROM jobs j2 \
                 WHERE j2.entry_id = j.entry_id AND j2.type = j.type \
               )"
        );

        let mut query = sqlx::query_scalar::<_, Uuid>(&sql);
        for id in entry_ids {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Notify subscribers; failures here never affect store correctness.
    fn publish(&self, job: &Job) {
        self.events.publish(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BroadcastEventSink, NoopEventSink};
    use shelfmark_db::{apply_schema, create_pool, DbConnectionConfig};
    use std::sync::Arc;

    async fn test_store() -> JobStore {
        // A single connection keeps the in-memory database shared across
        // sequential operations.
        let mut cfg = DbConnectionConfig::new("sqlite::memory:");
        cfg.max_connections = 1;
        let pool = create_pool(&cfg).await.expect("pool");
        apply_schema(&pool).await.expect("schema");
        JobStore::new(pool, Arc::new(NoopEventSink))
    }

    fn entry() -> Uuid {
        Uuid::new_v4()
    }

    #[tokio::test]
    async fn enqueue_starts_pending_with_zero_attempts() {
        let store = test_store().await;
        let job = store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.locked_at.is_none());

        let fetched = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn claim_takes_oldest_pending_first() {
        let store = test_store().await;
        let e = entry();
        let first = store.enqueue("ENRICH_ENTRY", e, None).await.unwrap();
        let second = store.enqueue("ENRICH_ENTRY", e, None).await.unwrap();

        let claimed = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempts, 1);
        assert!(claimed.locked_at.is_some());

        let claimed = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(store.claim_next_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claimers_share_one_job() {
        // File-backed database so every claimer gets its own real connection.
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("queue.sqlite");
        let cfg = DbConnectionConfig::for_file_path(db_path.to_str().unwrap());
        let pool = create_pool(&cfg).await.expect("pool");
        apply_schema(&pool).await.expect("schema");
        let store = JobStore::new(pool, Arc::new(NoopEventSink));

        store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.claim_next_pending().await },
            ));
        }

        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn retryable_failure_requeues_without_resetting_attempts() {
        let store = test_store().await;
        let job = store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();
        let claimed = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);

        store
            .mark_failed(job.id, "HTTP 503", None, true)
            .await
            .unwrap();

        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Pending);
        assert!(after.locked_at.is_none());
        assert_eq!(after.attempts, 1);
        assert_eq!(after.last_error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn terminal_failure_records_diagnostics() {
        let store = test_store().await;
        let job = store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();

        store
            .mark_failed(job.id, "no json object", Some("model said: hello"), false)
            .await
            .unwrap();

        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert!(after.finished_at.is_some());
        assert_eq!(after.last_response.as_deref(), Some("model said: hello"));
    }

    #[tokio::test]
    async fn retry_command_resets_attempts_and_clears_timestamps() {
        let store = test_store().await;
        let job = store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        store.mark_failed(job.id, "boom", None, false).await.unwrap();

        let affected = store.retry(job.id).await.unwrap();
        assert_eq!(affected, 1);

        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Pending);
        assert_eq!(after.attempts, 0);
        assert!(after.finished_at.is_none());
        assert!(after.locked_at.is_none());
    }

    #[tokio::test]
    async fn retry_refuses_non_terminal_jobs() {
        let store = test_store().await;
        let job = store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();
        assert_eq!(store.retry(job.id).await.unwrap(), 0);

        store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(store.retry(job.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancel_is_pending_only() {
        let store = test_store().await;
        let job = store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();

        assert_eq!(store.cancel_pending(job.id).await.unwrap(), 1);
        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Cancelled);
        assert!(after.finished_at.is_some());

        // Already cancelled: no-op.
        assert_eq!(store.cancel_pending(job.id).await.unwrap(), 0);

        // Running jobs cannot be cancelled.
        let running = store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(store.cancel_pending(running.id).await.unwrap(), 0);
        let still = store.get_by_id(running.id).await.unwrap().unwrap();
        assert_eq!(still.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn delete_excludes_running() {
        let store = test_store().await;
        let job = store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();

        assert_eq!(store.delete_if_not_running(job.id).await.unwrap(), 0);
        assert!(store.get_by_id(job.id).await.unwrap().is_some());

        store.mark_failed(job.id, "boom", None, false).await.unwrap();
        assert_eq!(store.delete_if_not_running(job.id).await.unwrap(), 1);
        assert!(store.get_by_id(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn success_purges_stale_failures_of_same_pair() {
        let store = test_store().await;
        let e = entry();

        let failed_a1 = store.enqueue("TYPE_A", e, None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        store
            .mark_failed(failed_a1.id, "boom", None, false)
            .await
            .unwrap();

        let failed_a2 = store.enqueue("TYPE_A", e, None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        store
            .mark_failed(failed_a2.id, "boom", None, false)
            .await
            .unwrap();

        let failed_b = store.enqueue("TYPE_B", e, None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        store
            .mark_failed(failed_b.id, "boom", None, false)
            .await
            .unwrap();

        let fresh = store.enqueue("TYPE_A", e, None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        store.mark_succeeded(fresh.id, None).await.unwrap();

        assert!(store.get_by_id(failed_a1.id).await.unwrap().is_none());
        assert!(store.get_by_id(failed_a2.id).await.unwrap().is_none());
        // Different type for the same entry is untouched.
        assert!(store.get_by_id(failed_b.id).await.unwrap().is_some());
        let fresh = store.get_by_id(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn list_filters_by_entry_and_status() {
        let store = test_store().await;
        let e1 = entry();
        let e2 = entry();
        store.enqueue("TYPE_A", e1, None).await.unwrap();
        let b = store.enqueue("TYPE_B", e1, None).await.unwrap();
        store.enqueue("TYPE_A", e2, None).await.unwrap();

        store.cancel_pending(b.id).await.unwrap();

        let all_for_e1 = store.list(Some(e1), &[], 50).await.unwrap();
        assert_eq!(all_for_e1.len(), 2);

        let cancelled = store
            .list(Some(e1), &[JobStatus::Cancelled], 50)
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, b.id);

        let pending_everywhere = store.list(None, &[JobStatus::Pending], 50).await.unwrap();
        assert_eq!(pending_everywhere.len(), 2);
    }

    #[tokio::test]
    async fn failed_latest_job_detection() {
        let store = test_store().await;
        let e1 = entry();
        let e2 = entry();

        // e1: TYPE_A failed, TYPE_B succeeded -> flagged because the latest
        // TYPE_A job is FAILED.
        let a = store.enqueue("TYPE_A", e1, None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        store.mark_failed(a.id, "boom", None, false).await.unwrap();
        let b = store.enqueue("TYPE_B", e1, None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        store.mark_succeeded(b.id, None).await.unwrap();

        // e2: only a succeeded job.
        let c = store.enqueue("TYPE_A", e2, None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        store.mark_succeeded(c.id, None).await.unwrap();

        let flagged = store
            .find_entry_ids_with_failed_latest_job(&[e1, e2])
            .await
            .unwrap();
        assert_eq!(flagged, vec![e1]);

        // A newer successful TYPE_A job clears the flag (and purges the
        // failed row).
        let a2 = store.enqueue("TYPE_A", e1, None).await.unwrap();
        store.claim_next_pending().await.unwrap().unwrap();
        store.mark_succeeded(a2.id, None).await.unwrap();
        let flagged = store
            .find_entry_ids_with_failed_latest_job(&[e1, e2])
            .await
            .unwrap();
        assert!(flagged.is_empty());
    }

    #[tokio::test]
    async fn mutations_publish_snapshots() {
        let mut cfg = DbConnectionConfig::new("sqlite::memory:");
        cfg.max_connections = 1;
        let pool = create_pool(&cfg).await.expect("pool");
        apply_schema(&pool).await.expect("schema");
        let sink = BroadcastEventSink::new(32);
        let mut rx = sink.subscribe();
        let store = JobStore::new(pool, Arc::new(sink));

        let job = store.enqueue("ENRICH_ENTRY", entry(), None).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().status, JobStatus::Pending);

        store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().status, JobStatus::Running);

        store.mark_succeeded(job.id, None).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().status, JobStatus::Succeeded);
    }
}
