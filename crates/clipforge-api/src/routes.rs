//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::artifacts::download_artifact;
use crate::handlers::health::{health, ready};
use crate::handlers::jobs::{cancel_job, delete_job, get_job_status, submit_job};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/:job_id", get(get_job_status))
        .route("/jobs/:job_id", delete(delete_job))
        .route("/jobs/:job_id/cancel", post(cancel_job))
        .route("/jobs/:job_id/artifacts/:operation_id", get(download_artifact));

    let mut router = Router::new()
        .nest("/api/v1", job_routes)
        .route("/health", get(health))
        .route("/ready", get(ready));

    if let Some(handle) = metrics_handle {
        router = router.route("/metrics", get(move || async move { handle.render() }));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .with_state(state)
}
