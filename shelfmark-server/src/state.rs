use shelfmark_db::DbPool;
use shelfmark_job_queue::{BroadcastEventSink, JobStore};

/// Shared application state passed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub job_store: JobStore,
    /// Live change feed; websocket fan-out subscribes here.
    pub job_events: BroadcastEventSink,
}

impl AppState {
    pub fn new(db_pool: DbPool, job_store: JobStore, job_events: BroadcastEventSink) -> Self {
        Self {
            db_pool,
            job_store,
            job_events,
        }
    }
}
