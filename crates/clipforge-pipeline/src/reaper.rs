//! Retention reaper for terminal jobs.
//!
//! Terminal jobs older than the retention age lose their output artifacts
//! and their record. Temp and input staging are already gone by the time a
//! job is terminal, so the reaper only touches the output namespace.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use clipforge_storage::StorageManager;

use crate::state::JobRegistry;

/// Background sweep deleting expired terminal jobs.
pub struct Reaper {
    registry: Arc<JobRegistry>,
    storage: Arc<StorageManager>,
    retention_age: Duration,
    sweep_interval: Duration,
}

impl Reaper {
    pub fn new(
        registry: Arc<JobRegistry>,
        storage: Arc<StorageManager>,
        retention_age: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            registry,
            storage,
            retention_age,
            sweep_interval,
        }
    }

    /// Run forever, sweeping on the configured interval.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let reaped = self.sweep().await;
            if reaped > 0 {
                info!("Reaped {} expired jobs", reaped);
            }
        }
    }

    /// Delete every terminal job older than the retention age. Returns the
    /// number of jobs removed.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let retention = match chrono::Duration::from_std(self.retention_age) {
            Ok(d) => d,
            Err(_) => return 0,
        };

        let mut reaped = 0;
        for job in self.registry.snapshots().await {
            if !job.is_terminal() {
                continue;
            }
            let Some(terminal_at) = job.terminal_at else {
                continue;
            };
            if now - terminal_at < retention {
                continue;
            }

            if let Err(e) = self.storage.remove_outputs(&job.id).await {
                warn!(job_id = %job.id, "Failed to remove outputs while reaping: {}", e);
                continue;
            }
            if let Err(e) = self.registry.remove(&job.id).await {
                warn!(job_id = %job.id, "Failed to remove job record while reaping: {}", e);
                continue;
            }
            reaped += 1;
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JobStore, MemoryJobStore};
    use clipforge_models::{EncodingConfig, FrameTransform, Job, JobSpec, JobStatus, OperationSpec};
    use clipforge_storage::{StorageConfig, StorageManager};
    use tempfile::TempDir;

    fn sample_job(status: JobStatus, terminal_secs_ago: Option<i64>) -> Job {
        let mut job = Job::new(&JobSpec {
            operations: vec![OperationSpec {
                trim: None,
                frame: FrameTransform::Keep,
                encoding: None,
                copy_streams: false,
            }],
            encoding: EncodingConfig::default(),
        });
        job.status = status;
        job.terminal_at = terminal_secs_ago.map(|s| Utc::now() - chrono::Duration::seconds(s));
        job
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_terminal_jobs() {
        let root = TempDir::new().unwrap();
        let storage = Arc::new(
            StorageManager::new(StorageConfig {
                input_dir: root.path().join("input"),
                output_dir: root.path().join("output"),
                temp_dir: root.path().join("temp"),
                max_upload_bytes: 1024,
            })
            .unwrap(),
        );
        let store = Arc::new(MemoryJobStore::new());
        let registry = Arc::new(JobRegistry::new(store as Arc<dyn JobStore>));

        let expired = sample_job(JobStatus::Completed, Some(7200));
        let fresh = sample_job(JobStatus::Completed, Some(60));
        let running = sample_job(JobStatus::Processing, None);

        let expired_id = expired.id.clone();
        let fresh_id = fresh.id.clone();
        let running_id = running.id.clone();

        // Give the expired job an output directory to reap
        let out_dir = root.path().join("output").join(expired_id.as_str());
        tokio::fs::create_dir_all(&out_dir).await.unwrap();
        tokio::fs::write(out_dir.join("op.mp4"), b"clip").await.unwrap();

        registry.insert(expired).await;
        registry.insert(fresh).await;
        registry.insert(running).await;

        let reaper = Reaper::new(
            Arc::clone(&registry),
            storage,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );

        assert_eq!(reaper.sweep().await, 1);
        assert!(registry.get(&expired_id).await.is_none());
        assert!(registry.get(&fresh_id).await.is_some());
        assert!(registry.get(&running_id).await.is_some());
        assert!(!out_dir.exists());

        // A second sweep finds nothing new
        assert_eq!(reaper.sweep().await, 0);
    }
}
