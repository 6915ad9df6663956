//! The poll/claim/execute/resolve loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::registry::JobRegistry;
use crate::store::JobStore;

/// Raw upstream text kept on the job row is bounded to this many bytes.
const MAX_DIAGNOSTIC_LEN: usize = 2000;

/// Single-flight worker over the shared job store.
///
/// One job is in flight per worker instance at a time; throughput scales by
/// running more instances, which is safe because the claim is atomic. The
/// loop never propagates errors: every outcome is recorded on the job row
/// and the loop returns to idle.
pub struct JobWorker {
    store: JobStore,
    registry: Arc<JobRegistry>,
    max_attempts: u32,
    poll_delay: Duration,
}

impl JobWorker {
    pub fn new(
        store: JobStore,
        registry: Arc<JobRegistry>,
        max_attempts: u32,
        poll_delay: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            max_attempts,
            poll_delay,
        }
    }

    /// Run until the shutdown signal flips. Ticks are strictly sequential;
    /// the delay runs between the end of one tick and the start of the next.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_delay_ms = self.poll_delay.as_millis() as u64,
            max_attempts = self.max_attempts,
            types = ?self.registry.registered_types(),
            "job worker started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_delay) => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    // A dropped sender also stops the loop.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("job worker stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One poll cycle: claim at most one job, run it, resolve it.
    pub async fn tick(&self) {
        let claimed = match self.store.claim_next_pending().await {
            Ok(claimed) => claimed,
            Err(err) => {
                warn!(error = %err, "failed to claim next pending job");
                return;
            }
        };
        let Some(job) = claimed else {
            return;
        };

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            entry_id = %job.entry_id,
            attempt = job.attempts,
            "processing job"
        );

        match self.registry.dispatch(&job).await {
            Ok(()) => {
                if let Err(err) = self.store.mark_succeeded(job.id, None).await {
                    error!(job_id = %job.id, error = %err, "failed to record job success");
                    return;
                }
                info!(job_id = %job.id, job_type = %job.job_type, "job succeeded");
            }
            Err(job_err) => {
                // Configuration/validation/parsing failures never self-resolve;
                // everything else retries while the attempt budget lasts.
                let retry = !job_err.is_fatal() && (job.attempts as u32) < self.max_attempts;
                let raw_response = job_err.raw_response().map(|raw| truncate(raw, MAX_DIAGNOSTIC_LEN));
                let message = job_err.to_string();

                if let Err(err) = self
                    .store
                    .mark_failed(job.id, &message, raw_response.as_deref(), retry)
                    .await
                {
                    error!(job_id = %job.id, error = %err, "failed to record job failure");
                }
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    entry_id = %job.entry_id,
                    retry,
                    attempts = job.attempts,
                    max_attempts = self.max_attempts,
                    error = %message,
                    "job failed"
                );
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::events::NoopEventSink;
    use crate::registry::JobHandler;
    use crate::types::JobStatus;
    use async_trait::async_trait;
    use shelfmark_db::{apply_schema, create_pool, DbConnectionConfig};
    use sqlx::types::Uuid;

    enum Behavior {
        Succeed,
        FailTransient,
        FailFatal,
        FailParsing,
    }

    struct ScriptedHandler {
        behavior: Behavior,
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        fn job_type(&self) -> &'static str {
            "SCRIPTED"
        }

        async fn process(&self, _job: &crate::types::Job) -> Result<(), JobError> {
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::FailTransient => Err(JobError::Upstream("HTTP 503".into())),
                Behavior::FailFatal => Err(JobError::Configuration("missing api key".into())),
                Behavior::FailParsing => Err(JobError::OutputParsing {
                    message: "no JSON object found in model output".into(),
                    raw_response: "sure! here is a description without json".into(),
                }),
            }
        }
    }

    async fn worker_with(behavior: Behavior, max_attempts: u32) -> (JobWorker, JobStore) {
        let mut cfg = DbConnectionConfig::new("sqlite::memory:");
        cfg.max_connections = 1;
        let pool = create_pool(&cfg).await.expect("pool");
        apply_schema(&pool).await.expect("schema");
        let store = JobStore::new(pool, std::sync::Arc::new(NoopEventSink));

        let mut registry = JobRegistry::new();
        registry.register(ScriptedHandler { behavior });
        let worker = JobWorker::new(
            store.clone(),
            Arc::new(registry),
            max_attempts,
            Duration::from_millis(10),
        );
        (worker, store)
    }

    #[tokio::test]
    async fn tick_with_empty_queue_is_a_noop() {
        let (worker, _store) = worker_with(Behavior::Succeed, 3).await;
        worker.tick().await;
    }

    #[tokio::test]
    async fn success_resolves_job() {
        let (worker, store) = worker_with(Behavior::Succeed, 3).await;
        let job = store
            .enqueue("SCRIPTED", Uuid::new_v4(), None)
            .await
            .unwrap();
        worker.tick().await;
        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Succeeded);
        assert!(after.finished_at.is_some());
    }

    #[tokio::test]
    async fn transient_failure_retries_until_ceiling() {
        let (worker, store) = worker_with(Behavior::FailTransient, 3).await;
        let job = store
            .enqueue("SCRIPTED", Uuid::new_v4(), None)
            .await
            .unwrap();

        // Attempts 1 and 2 requeue; attempt 3 exhausts the budget.
        worker.tick().await;
        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Pending);
        assert_eq!(after.attempts, 1);

        worker.tick().await;
        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Pending);
        assert_eq!(after.attempts, 2);

        worker.tick().await;
        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.attempts, 3);
        assert!(after.last_error.as_deref().unwrap().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn configuration_failure_is_terminal_on_first_attempt() {
        let (worker, store) = worker_with(Behavior::FailFatal, 3).await;
        let job = store
            .enqueue("SCRIPTED", Uuid::new_v4(), None)
            .await
            .unwrap();
        worker.tick().await;
        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.attempts, 1);
    }

    #[tokio::test]
    async fn parsing_failure_preserves_raw_response() {
        let (worker, store) = worker_with(Behavior::FailParsing, 3).await;
        let job = store
            .enqueue("SCRIPTED", Uuid::new_v4(), None)
            .await
            .unwrap();
        worker.tick().await;
        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(
            after.last_response.as_deref(),
            Some("sure! here is a description without json")
        );
    }

    #[tokio::test]
    async fn unknown_type_fails_fatally() {
        let (worker, store) = worker_with(Behavior::Succeed, 3).await;
        let job = store
            .enqueue("NOBODY_HANDLES_THIS", Uuid::new_v4(), None)
            .await
            .unwrap();
        worker.tick().await;
        let after = store.get_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Failed);
        assert!(after
            .last_error
            .as_deref()
            .unwrap()
            .contains("no handler registered"));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let (worker, _store) = worker_with(Behavior::Succeed, 3).await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));
        tx.send(true).expect("signal");
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker stopped")
            .expect("join");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        // 'é' is two bytes; cutting mid-char backs up to the boundary.
        assert_eq!(truncate("héllo", 2), "h");
    }
}
