//! Per-type job handlers and the dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::JobError;
use crate::types::Job;

/// A policy object processing one job type.
///
/// Handlers raise; the worker loop is the single place that classifies the
/// error and resolves the job. New job types are added by implementing this
/// trait and registering, not by touching the dispatcher.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> &'static str;

    /// Execute the job.
    async fn process(&self, job: &Job) -> Result<(), JobError>;
}

/// Dispatch table from job type to handler, built once at startup and passed
/// by reference to the worker loop.
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: JobHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.job_type(), Arc::new(handler));
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Resolve the handler for a job and run it. An unregistered type is a
    /// configuration error, never a transient failure.
    pub async fn dispatch(&self, job: &Job) -> Result<(), JobError> {
        let handler = self.handlers.get(job.job_type.as_str()).ok_or_else(|| {
            JobError::Configuration(format!(
                "no handler registered for job type: {}",
                job.job_type
            ))
        })?;
        handler.process(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;
    use sqlx::types::Uuid;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        fn job_type(&self) -> &'static str {
            "COUNT_ME"
        }

        async fn process(&self, _job: &Job) -> Result<(), JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn job_of_type(job_type: &str) -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            status: JobStatus::Running,
            entry_id: Uuid::new_v4(),
            payload_json: None,
            attempts: 1,
            locked_at: None,
            finished_at: None,
            last_error: None,
            last_response: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = JobRegistry::new();
        registry.register(CountingHandler {
            calls: calls.clone(),
        });

        registry.dispatch(&job_of_type("COUNT_ME")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_type_is_fatal_configuration_error() {
        let registry = JobRegistry::new();
        let err = registry
            .dispatch(&job_of_type("NOT_REGISTERED"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, JobError::Configuration(_)));
    }
}
