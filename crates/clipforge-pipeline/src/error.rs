//! Pipeline error types.

use thiserror::Error;

use clipforge_media::TranscodeError;
use clipforge_models::{ErrorKind, JobId, JobStatus, OperationStatus};
use clipforge_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Invalid operation transition: {from} -> {to}")]
    InvalidOperationTransition {
        from: OperationStatus,
        to: OperationStatus,
    },

    #[error("Job {0} is not terminal")]
    NotTerminal(JobId),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Store error: {0}")]
    Store(String),
}

impl PipelineError {
    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidSpec(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Map into the API-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidSpec(_) => ErrorKind::InvalidSpec,
            PipelineError::NotFound(_) => ErrorKind::NotFound,
            PipelineError::InvalidTransition { .. }
            | PipelineError::InvalidOperationTransition { .. } => ErrorKind::InvalidTransition,
            PipelineError::NotTerminal(_) => ErrorKind::InvalidSpec,
            PipelineError::Storage(e) => e.kind(),
            PipelineError::Transcode(e) => e.kind(),
            PipelineError::Store(_) => ErrorKind::IoFault,
        }
    }
}
