use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::Json;
use serde_json::Value;
use shelfmark_job_queue::JobStatus;
use sqlx::types::Uuid;

use super::job_json;
use crate::{error::ApiError, state::AppState};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// GET /api/jobs
/// Queue visibility endpoint.
/// Example: /api/jobs?entryId=...&status=PENDING,RUNNING,FAILED&limit=50
pub async fn list(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let entry_id: Option<Uuid> = match params.get("entryId").map(String::as_str) {
        Some(raw) if !raw.trim().is_empty() => Some(
            raw.parse()
                .map_err(|_| ApiError::bad_request(format!("invalid entryId: {raw}")))?,
        ),
        _ => None,
    };

    let statuses = parse_statuses(params.get("status").map(String::as_str))?;

    let limit = match params.get("limit") {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .ok_or_else(|| {
                ApiError::bad_request(format!("limit must be between 1 and {MAX_LIMIT}"))
            })?,
        None => DEFAULT_LIMIT,
    };

    let jobs = state.job_store.list(entry_id, &statuses, limit).await?;
    Ok(Json(jobs.iter().map(job_json).collect()))
}

fn parse_statuses(raw: Option<&str>) -> Result<Vec<JobStatus>, ApiError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            JobStatus::parse(s).ok_or_else(|| ApiError::bad_request(format!("unknown status: {s}")))
        })
        .collect()
}
