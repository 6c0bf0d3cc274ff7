//! Operation records: one concrete transcoding unit within a job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::JobError;
use crate::job::JobId;
use crate::spec::OperationSpec;

/// Unique identifier for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    /// Generate a new random operation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting for a worker slot
    #[default]
    Pending,
    /// The transcoder is running
    Running,
    /// Artifact committed to output storage
    Succeeded,
    /// Retries exhausted or failure was not retryable
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Running => "running",
            OperationStatus::Succeeded => "succeeded",
            OperationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Succeeded | OperationStatus::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One transcoding unit owned by a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Operation {
    /// Unique operation ID
    pub id: OperationId,

    /// Owning job
    pub job_id: JobId,

    /// Position within the job; determines output naming
    pub index: u32,

    /// Validated transformation parameters
    pub params: OperationSpec,

    /// Lifecycle state
    #[serde(default)]
    pub status: OperationStatus,

    /// Committed artifact path, set once succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Invocation attempts made so far (including the first)
    #[serde(default)]
    pub attempts: u32,

    /// Classified failure, set once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl Operation {
    /// Create a pending operation from its spec.
    pub fn new(job_id: JobId, index: u32, params: OperationSpec) -> Self {
        Self {
            id: OperationId::new(),
            job_id,
            index,
            params,
            status: OperationStatus::Pending,
            output: None,
            attempts: 0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FrameTransform;

    #[test]
    fn test_operation_creation() {
        let job_id = JobId::new();
        let op = Operation::new(
            job_id.clone(),
            0,
            OperationSpec {
                trim: None,
                frame: FrameTransform::Keep,
                encoding: None,
                copy_streams: false,
            },
        );
        assert_eq!(op.job_id, job_id);
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempts, 0);
        assert!(op.output.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Running.is_terminal());
        assert!(OperationStatus::Succeeded.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
    }
}
