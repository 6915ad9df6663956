pub mod cancel;
pub mod delete;
pub mod enqueue;
pub mod get;
pub mod list;
pub mod retry;

use serde_json::{json, Value};
use shelfmark_job_queue::Job;
use sqlx::types::Uuid;

use crate::error::ApiError;

/// Wire shape shared by every jobs route.
pub(crate) fn job_json(job: &Job) -> Value {
    json!({
        "id": job.id,
        "type": job.job_type,
        "status": job.status.to_string(),
        "entryId": job.entry_id,
        "payload": job.payload(),
        "attempts": job.attempts,
        "lockedAt": job.locked_at,
        "finishedAt": job.finished_at,
        "lastError": job.last_error,
        "lastResponse": job.last_response,
        "createdAt": job.created_at,
    })
}

pub(crate) fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid job id: {raw}")))
}
