//! Classification of non-zero FFmpeg exits.
//!
//! The pattern table is intentionally small and explicit: only diagnostics
//! that unambiguously indicate unusable input map to `InvalidMedia`.
//! Everything else stays a retryable `TranscodeFailed`, since guessing at
//! tool internals risks burying transient failures as permanent ones.

use crate::error::TranscodeError;

/// Stderr fragments that identify input-determined failures.
///
/// Matching is case-insensitive on the captured stderr tail.
const INVALID_MEDIA_PATTERNS: &[&str] = &[
    "invalid data found when processing input",
    "moov atom not found",
    "could not find codec parameters",
    "does not contain any stream",
    "header missing",
];

/// Classify a non-zero FFmpeg exit from its captured stderr.
pub fn classify_failure(stderr: &str, exit_code: Option<i32>) -> TranscodeError {
    let lowered = stderr.to_lowercase();

    for &pattern in INVALID_MEDIA_PATTERNS {
        if lowered.contains(pattern) {
            return TranscodeError::InvalidMedia(
                stderr
                    .lines()
                    .find(|line| line.to_lowercase().contains(pattern))
                    .unwrap_or(pattern)
                    .trim()
                    .to_string(),
            );
        }
    }

    TranscodeError::failed(
        match exit_code {
            Some(code) => format!("ffmpeg exited with status {}", code),
            None => "ffmpeg terminated by signal".to_string(),
        },
        if stderr.is_empty() {
            None
        } else {
            Some(stderr.to_string())
        },
        exit_code,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_media_patterns_match() {
        let stderr = "[mov,mp4,m4a] moov atom not found\nupload.mp4: Invalid data found when processing input";
        let err = classify_failure(stderr, Some(1));
        assert!(matches!(err, TranscodeError::InvalidMedia(_)));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let err = classify_failure("Header missing", Some(1));
        assert!(matches!(err, TranscodeError::InvalidMedia(_)));
    }

    #[test]
    fn test_unmatched_exit_is_conservative() {
        let err = classify_failure("Error while filtering: out of memory", Some(1));
        match err {
            TranscodeError::Failed { exit_code, .. } => assert_eq!(exit_code, Some(1)),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_signal_exit() {
        let err = classify_failure("", None);
        match err {
            TranscodeError::Failed { message, stderr, .. } => {
                assert!(message.contains("signal"));
                assert!(stderr.is_none());
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
