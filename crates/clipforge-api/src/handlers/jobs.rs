//! Job submission and lifecycle handlers.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;
use tracing::info;

use clipforge_models::{Job, JobError, JobId, JobSpec, OperationStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response to a job submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
}

/// Job snapshot returned to pollers.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub operations: Vec<OperationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_at: Option<DateTime<Utc>>,
}

/// Per-operation view within a status response.
#[derive(Debug, Serialize)]
pub struct OperationView {
    pub operation_id: String,
    pub index: u32,
    pub status: String,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Download link, present once the operation has succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
}

impl JobStatusResponse {
    fn from_job(job: &Job) -> Self {
        let operations = job
            .operations
            .iter()
            .map(|op| OperationView {
                operation_id: op.id.to_string(),
                index: op.index,
                status: op.status.as_str().to_string(),
                attempts: op.attempts,
                error: op.error.clone(),
                artifact_url: (op.status == OperationStatus::Succeeded).then(|| {
                    format!("/api/v1/jobs/{}/artifacts/{}", job.id, op.id)
                }),
            })
            .collect();

        Self {
            job_id: job.id.to_string(),
            status: job.status.as_str().to_string(),
            progress: job.progress(),
            operations,
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            terminal_at: job.terminal_at,
        }
    }
}

/// POST /api/v1/jobs
///
/// Multipart submission: a `spec` field holding the JSON job spec, followed
/// by a `file` field with the source video. The upload streams straight into
/// staging; it is never buffered in memory.
pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let mut spec: Option<JobSpec> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("spec") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("unreadable spec field: {}", e)))?;
                let parsed: JobSpec = serde_json::from_str(&text)
                    .map_err(|e| ApiError::bad_request(format!("invalid spec JSON: {}", e)))?;
                spec = Some(parsed);
            }
            Some("file") => {
                let spec = spec.take().ok_or_else(|| {
                    ApiError::bad_request("the spec field must precede the file field")
                })?;
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::bad_request("file field has no filename"))?;

                let reader = StreamReader::new(Box::pin(
                    field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
                ));

                let job_id = state.orchestrator.submit(&filename, spec, reader).await?;
                info!(job_id = %job_id, "Accepted job submission");

                return Ok((
                    StatusCode::ACCEPTED,
                    Json(SubmitResponse {
                        job_id: job_id.to_string(),
                        status: state.orchestrator.status(&job_id).await?.status.to_string(),
                    }),
                ));
            }
            _ => {
                // Unknown fields are ignored, matching lenient multipart
                // handling elsewhere
            }
        }
    }

    Err(ApiError::bad_request(
        "multipart body must contain spec and file fields",
    ))
}

/// GET /api/v1/jobs/:job_id
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state
        .orchestrator
        .status(&JobId::from_string(job_id))
        .await?;
    Ok(Json(JobStatusResponse::from_job(&job)))
}

/// POST /api/v1/jobs/:job_id/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<SubmitResponse>> {
    let job = state
        .orchestrator
        .cancel(&JobId::from_string(job_id))
        .await?;
    info!(job_id = %job.id, status = %job.status, "Cancellation requested");
    Ok(Json(SubmitResponse {
        job_id: job.id.to_string(),
        status: job.status.to_string(),
    }))
}

/// DELETE /api/v1/jobs/:job_id
///
/// Removes a terminal job's outputs and record. 409 for running jobs.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .orchestrator
        .delete(&JobId::from_string(job_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{EncodingConfig, FrameTransform, JobSpec, OperationSpec};

    #[test]
    fn test_status_response_view() {
        let mut job = Job::new(&JobSpec {
            operations: vec![
                OperationSpec {
                    trim: None,
                    frame: FrameTransform::Keep,
                    encoding: None,
                    copy_streams: false,
                },
                OperationSpec {
                    trim: None,
                    frame: FrameTransform::Keep,
                    encoding: None,
                    copy_streams: false,
                },
            ],
            encoding: EncodingConfig::default(),
        });
        job.operations[0].status = OperationStatus::Succeeded;
        job.operations[0].output = Some("/out/a.mp4".into());

        let view = JobStatusResponse::from_job(&job);
        assert_eq!(view.operations.len(), 2);
        let url = view.operations[0].artifact_url.as_ref().unwrap();
        assert!(url.starts_with("/api/v1/jobs/"));
        assert!(url.contains(&view.operations[0].operation_id));
        assert!(view.operations[1].artifact_url.is_none());
        // Raw storage paths never appear in API responses
        let body = serde_json::to_string(&view).unwrap();
        assert!(!body.contains("/out/a.mp4"));
    }
}
