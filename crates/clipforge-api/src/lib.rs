//! Axum HTTP layer over the ClipForge pipeline.
//!
//! A thin surface: multipart submit, status polling, artifact download,
//! cancel, cleanup, and health endpoints. All job semantics live in
//! `clipforge-pipeline`; handlers translate between HTTP and the
//! orchestrator's error taxonomy.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
