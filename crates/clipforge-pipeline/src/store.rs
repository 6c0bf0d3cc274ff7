//! Durable job record persistence.
//!
//! The pipeline treats persistence as a key-value seam: upsert/get/remove of
//! whole job snapshots by id. The in-memory machines stay authoritative;
//! the store is for durability and inspection.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use clipforge_models::{Job, JobId};

use crate::error::{PipelineError, PipelineResult};

/// Key-value persistence for job snapshots.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace the record for `job.id`.
    async fn upsert(&self, job: &Job) -> PipelineResult<()>;

    /// Fetch a record by id.
    async fn get(&self, id: &JobId) -> PipelineResult<Option<Job>>;

    /// Remove a record by id. Removing an absent record is not an error.
    async fn remove(&self, id: &JobId) -> PipelineResult<()>;
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn upsert(&self, job: &Job) -> PipelineResult<()> {
        self.jobs
            .write()
            .await
            .insert(job.id.as_str().to_string(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> PipelineResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id.as_str()).cloned())
    }

    async fn remove(&self, id: &JobId) -> PipelineResult<()> {
        self.jobs.write().await.remove(id.as_str());
        Ok(())
    }
}

/// File-backed store writing one `{job_id}.json` per job.
pub struct JsonJobStore {
    dir: PathBuf,
}

impl JsonJobStore {
    /// Create the store, ensuring its directory exists.
    pub fn new(dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| PipelineError::store(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl JobStore for JsonJobStore {
    async fn upsert(&self, job: &Job) -> PipelineResult<()> {
        let path = self.path_for(&job.id);
        let bytes = serde_json::to_vec_pretty(job)
            .map_err(|e| PipelineError::store(format!("serialize {}: {}", job.id, e)))?;

        // Write-then-rename keeps readers from ever seeing a half record
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| PipelineError::store(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| PipelineError::store(format!("rename {}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn get(&self, id: &JobId) -> PipelineResult<Option<Job>> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let job = serde_json::from_slice(&bytes)
                    .map_err(|e| PipelineError::store(format!("parse {}: {}", path.display(), e)))?;
                Ok(Some(job))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::store(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn remove(&self, id: &JobId) -> PipelineResult<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::store(format!("remove {}: {}", id, e))),
        }
    }
}
