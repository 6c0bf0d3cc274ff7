//! API-facing error taxonomy.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable classification of job and operation failures.
///
/// This is the only error vocabulary exposed to API callers; the raw
/// diagnostics behind a failure (tool stderr, io error chains) stay in the
/// operational logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request rejected before any resource was touched
    InvalidSpec,
    /// Disk read/write failure during staging or commit
    IoFault,
    /// Upload exceeded the configured size ceiling
    QuotaExceeded,
    /// The source media is unreadable or not a video
    InvalidMedia,
    /// The transcoder exceeded its wall-clock budget
    Timeout,
    /// The external transcoding tool is missing or cannot be spawned
    ToolUnavailable,
    /// The transcoder failed for a reason we could not classify
    TranscodeFailed,
    /// A state transition violated the lifecycle graph (internal fault)
    InvalidTransition,
    /// Unknown job or artifact
    NotFound,
    /// The job was cancelled on request
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSpec => "invalid_spec",
            ErrorKind::IoFault => "io_fault",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::InvalidMedia => "invalid_media",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ToolUnavailable => "tool_unavailable",
            ErrorKind::TranscodeFailed => "transcode_failed",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// True when the failure is attributable to the caller's input rather
    /// than the system's environment.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidSpec
                | ErrorKind::QuotaExceeded
                | ErrorKind::InvalidMedia
                | ErrorKind::NotFound
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified failure attached to a job or operation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Failure classification
    pub kind: ErrorKind,
    /// Human-readable detail, safe to show to API callers
    pub detail: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}
