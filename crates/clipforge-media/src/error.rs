//! Error types for transcoder invocation.

use std::path::PathBuf;
use thiserror::Error;

use clipforge_models::ErrorKind;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, TranscodeError>;

/// Errors that can occur while invoking the external transcoder.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("FFmpeg not found in PATH")]
    ToolUnavailable,

    #[error("Invalid media: {0}")]
    InvalidMedia(String),

    #[error("Transcode timed out after {0} seconds")]
    Timeout(u64),

    #[error("Transcode failed: {message}")]
    Failed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Transcoder produced no usable output at {0}")]
    MissingOutput(PathBuf),

    #[error("Probe failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl TranscodeError {
    /// Create a transcode failure error.
    pub fn failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::Failed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Map into the API-facing taxonomy. Raw stderr never crosses this
    /// boundary; it stays in the operational logs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscodeError::ToolUnavailable => ErrorKind::ToolUnavailable,
            TranscodeError::InvalidMedia(_) | TranscodeError::ProbeFailed { .. } => {
                ErrorKind::InvalidMedia
            }
            TranscodeError::Timeout(_) => ErrorKind::Timeout,
            TranscodeError::Failed { .. }
            | TranscodeError::MissingOutput(_)
            | TranscodeError::JsonParse(_) => ErrorKind::TranscodeFailed,
            TranscodeError::Cancelled => ErrorKind::Cancelled,
            TranscodeError::Io(_) => ErrorKind::IoFault,
        }
    }

    /// Caller-safe one-line description, without tool diagnostics.
    pub fn detail(&self) -> String {
        match self {
            TranscodeError::Failed { message, .. } => message.clone(),
            TranscodeError::ProbeFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(TranscodeError::ToolUnavailable.kind(), ErrorKind::ToolUnavailable);
        assert_eq!(TranscodeError::Timeout(30).kind(), ErrorKind::Timeout);
        assert_eq!(
            TranscodeError::InvalidMedia("moov atom not found".into()).kind(),
            ErrorKind::InvalidMedia
        );
        assert_eq!(
            TranscodeError::failed("exit 1", None, Some(1)).kind(),
            ErrorKind::TranscodeFailed
        );
    }

    #[test]
    fn test_detail_excludes_stderr() {
        let err = TranscodeError::failed(
            "ffmpeg exited with status 1",
            Some("x264 [error]: internal gibberish".into()),
            Some(1),
        );
        assert!(!err.detail().contains("gibberish"));
    }
}
