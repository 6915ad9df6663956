use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::Json;
use serde_json::Value;

use super::{job_json, parse_job_id};
use crate::{error::ApiError, state::AppState};

/// GET /api/jobs/{id}
pub async fn get(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job_id = parse_job_id(&id)?;
    let job = state
        .job_store
        .get_by_id(job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {job_id}")))?;
    Ok(Json(job_json(&job)))
}
