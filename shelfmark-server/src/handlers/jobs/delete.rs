use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;

use super::parse_job_id;
use crate::{error::ApiError, state::AppState};

/// DELETE /api/jobs/{id}
/// Removes the job record (allowed for everything except RUNNING).
pub async fn delete(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let job_id = parse_job_id(&id)?;
    let affected = state.job_store.delete_if_not_running(job_id).await?;
    if affected == 0 {
        return Err(ApiError::conflict("job is running or does not exist"));
    }
    Ok(StatusCode::NO_CONTENT)
}
