//! Job state machine and pipeline orchestrator for ClipForge.
//!
//! The orchestrator takes a validated upload, derives transcoding operations
//! from the spec, runs them through a bounded worker pool, and drives each
//! job to exactly one terminal state. All job mutation goes through
//! [`JobStateMachine`] transition calls; storage cleanup is guaranteed on
//! every exit path.

pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod reaper;
pub mod state;
pub mod store;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use logging::JobLogger;
pub use orchestrator::Orchestrator;
pub use reaper::Reaper;
pub use state::{JobRegistry, JobStateMachine};
pub use store::{JobStore, JsonJobStore, MemoryJobStore};
