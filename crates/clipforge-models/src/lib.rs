//! Shared data models for the ClipForge backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their transcoding operations
//! - Job specifications and their validation
//! - Encoding configuration
//! - The API-facing error taxonomy
//! - Timecode parsing

pub mod encoding;
pub mod error;
pub mod job;
pub mod operation;
pub mod spec;
pub mod timecode;

// Re-export common types
pub use encoding::EncodingConfig;
pub use error::{ErrorKind, JobError};
pub use job::{Job, JobId, JobStatus, TransitionRecord};
pub use operation::{Operation, OperationId, OperationStatus};
pub use spec::{CropRegion, FrameTransform, JobSpec, OperationSpec, SpecViolation, Trim, VerticalParams};
pub use timecode::{format_secs, parse_timecode, TimecodeError};
