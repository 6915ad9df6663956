use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Build the primary axum router with the provided shared application state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/jobs",
            get(handlers::jobs::list::list).post(handlers::jobs::enqueue::enqueue),
        )
        .route(
            "/api/jobs/{id}",
            get(handlers::jobs::get::get).delete(handlers::jobs::delete::delete),
        )
        .route("/api/jobs/{id}/cancel", post(handlers::jobs::cancel::cancel))
        .route("/api/jobs/{id}/retry", post(handlers::jobs::retry::retry))
        .layer(Extension(state))
}
