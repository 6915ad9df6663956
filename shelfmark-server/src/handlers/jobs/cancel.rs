use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;

use super::parse_job_id;
use crate::{error::ApiError, state::AppState};

/// POST /api/jobs/{id}/cancel
/// Cancels only PENDING jobs (so they will not be processed).
pub async fn cancel(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let job_id = parse_job_id(&id)?;
    let affected = state.job_store.cancel_pending(job_id).await?;
    if affected == 0 {
        return Err(ApiError::conflict("job is not pending or does not exist"));
    }
    Ok(StatusCode::NO_CONTENT)
}
