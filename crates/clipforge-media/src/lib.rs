//! FFmpeg CLI wrapper for the ClipForge pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A process runner with timeout, cancellation, and stderr capture
//! - Classification of tool failures into the stable error taxonomy
//! - Retry with exponential backoff for transient failures
//! - FFprobe-based input probing

pub mod classify;
pub mod command;
pub mod error;
pub mod filters;
pub mod invoker;
pub mod probe;
pub mod retry;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaResult, TranscodeError};
pub use invoker::{FfmpegTranscoder, InvokerConfig, TranscodeOutcome, TranscodeRequest, Transcoder};
pub use probe::{probe_video, MediaInfo};
pub use retry::RetryPolicy;
