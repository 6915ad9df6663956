use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use sqlx::types::Uuid;

use super::job_json;
use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(rename = "entryId")]
    pub entry_id: Uuid,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// POST /api/jobs
/// Thin pass-through to the store; no dedup across types.
pub async fn enqueue(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if request.job_type.trim().is_empty() {
        return Err(ApiError::bad_request("type must not be empty"));
    }

    let job = state
        .job_store
        .enqueue(
            request.job_type.trim(),
            request.entry_id,
            request.payload.as_ref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(job_json(&job))))
}
