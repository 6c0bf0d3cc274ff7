//! Artifact download handler.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use clipforge_models::{JobId, OperationId, OperationStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/v1/jobs/:job_id/artifacts/:operation_id
///
/// Streams the committed artifact for a succeeded operation. The path is
/// derived purely from the two ids; nothing user-controlled touches the
/// filesystem lookup.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path((job_id, operation_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let job_id = JobId::from_string(job_id);
    let operation_id = OperationId::from_string(operation_id);

    let job = state.orchestrator.status(&job_id).await?;
    let operation = job
        .operations
        .iter()
        .find(|op| op.id == operation_id)
        .ok_or_else(|| ApiError::not_found(format!("operation {}", operation_id)))?;

    if operation.status != OperationStatus::Succeeded {
        return Err(ApiError::not_found(format!(
            "operation {} has no artifact (status: {})",
            operation_id, operation.status
        )));
    }

    let path = state.storage.output_path(&job_id, &operation_id);
    let file = tokio::fs::File::open(&path).await.map_err(|_| {
        ApiError::not_found(format!("artifact for operation {}", operation_id))
    })?;

    let stream = ReaderStream::new(file);
    let filename = format!("{}_{}.mp4", job_id, operation_id);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("response build failed: {}", e)))
}
