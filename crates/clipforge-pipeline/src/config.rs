//! Pipeline configuration.

use std::time::Duration;

use clipforge_models::spec::MAX_OPERATIONS_PER_JOB;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrency ceiling across all jobs; bounds the number of live
    /// transcoder processes
    pub max_concurrent_operations: usize,
    /// Operation count bound checked at spec validation
    pub max_operations_per_job: usize,
    /// Age after which terminal jobs and their outputs are reaped
    pub retention_age: Duration,
    /// How often the reaper sweeps
    pub retention_sweep_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 4,
            max_operations_per_job: MAX_OPERATIONS_PER_JOB,
            retention_age: Duration::from_secs(24 * 3600),
            retention_sweep_interval: Duration::from_secs(15 * 60),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_operations: std::env::var("PIPELINE_MAX_CONCURRENT_OPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_operations),
            max_operations_per_job: std::env::var("PIPELINE_MAX_OPERATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_operations_per_job),
            retention_age: Duration::from_secs(
                std::env::var("PIPELINE_RETENTION_HOURS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|h| h * 3600)
                    .unwrap_or(defaults.retention_age.as_secs()),
            ),
            retention_sweep_interval: Duration::from_secs(
                std::env::var("PIPELINE_RETENTION_SWEEP_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retention_sweep_interval.as_secs()),
            ),
        }
    }
}
