//! Job records and the lifecycle graph.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::encoding::EncodingConfig;
use crate::error::JobError;
use crate::operation::{Operation, OperationStatus};
use crate::spec::JobSpec;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
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

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// Transitions are validated by [`JobStatus::can_transition_to`]; terminal
/// states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, input not yet staged
    #[default]
    Queued,
    /// Upload is being written into input storage
    Staging,
    /// Operations are being dispatched and executed
    Processing,
    /// Every operation succeeded
    Completed,
    /// Some operations succeeded, some failed
    Partial,
    /// No operation succeeded, or staging failed, or the tool is missing
    Failed,
    /// Cancelled on request
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Staging => "staging",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// The lifecycle graph. Anything not listed here is an invalid
    /// transition and must be rejected.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Staging)
                | (Staging, Processing)
                | (Staging, Failed)
                | (Processing, Completed)
                | (Processing, Partial)
                | (Processing, Failed)
                | (Queued | Staging | Processing, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One applied transition, kept as an audit trail on the job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TransitionRecord {
    pub status: JobStatus,
    pub at: DateTime<Utc>,
}

/// One end-to-end request to produce derivative clips from a source video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Lifecycle state
    #[serde(default)]
    pub status: JobStatus,

    /// Staged input path, owned by storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    /// Operations in submission order
    pub operations: Vec<Operation>,

    /// Job-level encoding defaults from the spec
    #[serde(default)]
    pub encoding: EncodingConfig,

    /// Applied transitions with timestamps
    #[serde(default)]
    pub history: Vec<TransitionRecord>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Set once a terminal status is reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_at: Option<DateTime<Utc>>,

    /// Classified failure; present iff status is `failed` or `partial`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl Job {
    /// Create a queued job, deriving one operation per spec entry.
    pub fn new(spec: &JobSpec) -> Self {
        let id = JobId::new();
        let now = Utc::now();
        let operations = spec
            .operations
            .iter()
            .enumerate()
            .map(|(index, op)| Operation::new(id.clone(), index as u32, op.clone()))
            .collect();

        Self {
            id,
            status: JobStatus::Queued,
            source: None,
            operations,
            encoding: spec.encoding.clone(),
            history: vec![TransitionRecord {
                status: JobStatus::Queued,
                at: now,
            }],
            created_at: now,
            updated_at: now,
            terminal_at: None,
            error: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Coarse progress percentage from terminal operation count.
    pub fn progress(&self) -> u8 {
        if self.is_terminal() {
            return 100;
        }
        let total = self.operations.len();
        if total == 0 {
            return 0;
        }
        let done = self
            .operations
            .iter()
            .filter(|op| op.status.is_terminal())
            .count();
        ((done * 100) / total) as u8
    }

    /// Count of succeeded operations.
    pub fn succeeded_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| op.status == OperationStatus::Succeeded)
            .count()
    }

    /// Count of failed operations.
    pub fn failed_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| op.status == OperationStatus::Failed)
            .count()
    }
}
