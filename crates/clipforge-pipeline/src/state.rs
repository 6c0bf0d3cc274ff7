//! The job state machine: the single writer of every job record.
//!
//! All mutation goes through transition calls on [`JobStateMachine`]. Each
//! machine serializes its own transitions behind a mutex, so completion
//! callbacks arriving from concurrent workers can never interleave a
//! half-applied update, and observers always read a consistent snapshot.
//! A rejected transition leaves the record untouched.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::error;

use clipforge_models::{
    Job, JobError, JobId, JobStatus, OperationId, OperationStatus, TransitionRecord,
};

use crate::error::{PipelineError, PipelineResult};
use crate::store::JobStore;

/// Authoritative, serialized record of one job's lifecycle.
pub struct JobStateMachine {
    job: Mutex<Job>,
    cancel_tx: watch::Sender<bool>,
    store: Arc<dyn JobStore>,
}

impl JobStateMachine {
    pub fn new(job: Job, store: Arc<dyn JobStore>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            job: Mutex::new(job),
            cancel_tx,
            store,
        }
    }

    /// A consistent point-in-time copy of the record.
    pub async fn snapshot(&self) -> Job {
        self.job.lock().await.clone()
    }

    /// Request cooperative cancellation. Idempotent.
    pub fn request_cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Subscribe to the cancellation signal.
    pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Whether cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Apply a status transition.
    ///
    /// Transitions not on the lifecycle graph are rejected with
    /// `InvalidTransition` and logged loudly; the prior state is retained.
    pub async fn transition(&self, next: JobStatus) -> PipelineResult<Job> {
        self.apply(next, |_| {}).await
    }

    /// Apply a terminal transition carrying an optional classified error.
    pub async fn conclude(
        &self,
        terminal: JobStatus,
        error: Option<JobError>,
    ) -> PipelineResult<Job> {
        self.apply(terminal, move |job| job.error = error).await
    }

    /// Record the staged input path.
    pub async fn set_source(&self, path: PathBuf) {
        let mut job = self.job.lock().await;
        job.source = Some(path);
        job.updated_at = Utc::now();
        let snapshot = job.clone();
        drop(job);
        self.persist(&snapshot).await;
    }

    async fn apply(
        &self,
        next: JobStatus,
        mutate: impl FnOnce(&mut Job),
    ) -> PipelineResult<Job> {
        let mut job = self.job.lock().await;

        if !job.status.can_transition_to(next) {
            // An invalid transition is a bug in the caller, never a user
            // condition. Reject without touching the record.
            error!(
                job_id = %job.id,
                from = %job.status,
                to = %next,
                "Rejected invalid job transition"
            );
            return Err(PipelineError::InvalidTransition {
                from: job.status,
                to: next,
            });
        }

        let now = Utc::now();
        job.status = next;
        job.updated_at = now;
        job.history.push(TransitionRecord { status: next, at: now });
        if next.is_terminal() {
            job.terminal_at = Some(now);
        }
        mutate(&mut job);

        let snapshot = job.clone();
        drop(job);
        self.persist(&snapshot).await;
        Ok(snapshot)
    }

    /// Mark an operation as running.
    pub async fn operation_running(&self, operation_id: &OperationId) -> PipelineResult<()> {
        self.apply_operation(operation_id, OperationStatus::Running, |_| {})
            .await
    }

    /// Mark an operation as succeeded with its committed artifact.
    pub async fn operation_succeeded(
        &self,
        operation_id: &OperationId,
        output: PathBuf,
        attempts: u32,
    ) -> PipelineResult<()> {
        self.apply_operation(operation_id, OperationStatus::Succeeded, move |op| {
            op.output = Some(output);
            op.attempts = attempts;
        })
        .await
    }

    /// Mark an operation as failed with its classified error.
    pub async fn operation_failed(
        &self,
        operation_id: &OperationId,
        error: JobError,
        attempts: u32,
    ) -> PipelineResult<()> {
        self.apply_operation(operation_id, OperationStatus::Failed, move |op| {
            op.error = Some(error);
            op.attempts = attempts;
        })
        .await
    }

    async fn apply_operation(
        &self,
        operation_id: &OperationId,
        next: OperationStatus,
        mutate: impl FnOnce(&mut clipforge_models::Operation),
    ) -> PipelineResult<()> {
        let mut job = self.job.lock().await;
        let job_id = job.id.clone();

        let op = job
            .operations
            .iter_mut()
            .find(|op| &op.id == operation_id)
            .ok_or_else(|| PipelineError::NotFound(job_id.clone()))?;

        let valid = matches!(
            (op.status, next),
            (OperationStatus::Pending, OperationStatus::Running)
                | (OperationStatus::Running, OperationStatus::Succeeded)
                | (OperationStatus::Running, OperationStatus::Failed)
        );
        if !valid {
            error!(
                job_id = %job_id,
                operation_id = %operation_id,
                from = %op.status,
                to = %next,
                "Rejected invalid operation transition"
            );
            return Err(PipelineError::InvalidOperationTransition {
                from: op.status,
                to: next,
            });
        }

        op.status = next;
        mutate(op);
        job.updated_at = Utc::now();

        let snapshot = job.clone();
        drop(job);
        self.persist(&snapshot).await;
        Ok(())
    }

    /// Best-effort durable snapshot. A store failure is logged loudly but
    /// never unwinds a transition that already happened in memory.
    async fn persist(&self, snapshot: &Job) {
        if let Err(e) = self.store.upsert(snapshot).await {
            error!(job_id = %snapshot.id, "Failed to persist job snapshot: {}", e);
        }
    }
}

/// All live state machines, keyed by job id.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobStateMachine>>>,
    store: Arc<dyn JobStore>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Register a new job and persist its initial snapshot.
    pub async fn insert(&self, job: Job) -> Arc<JobStateMachine> {
        let id = job.id.as_str().to_string();
        if let Err(e) = self.store.upsert(&job).await {
            error!(job_id = %job.id, "Failed to persist new job: {}", e);
        }
        let machine = Arc::new(JobStateMachine::new(job, Arc::clone(&self.store)));
        self.jobs.write().await.insert(id, Arc::clone(&machine));
        machine
    }

    pub async fn get(&self, id: &JobId) -> Option<Arc<JobStateMachine>> {
        self.jobs.read().await.get(id.as_str()).cloned()
    }

    /// Drop a job from the registry and the store.
    pub async fn remove(&self, id: &JobId) -> PipelineResult<()> {
        self.jobs.write().await.remove(id.as_str());
        self.store.remove(id).await
    }

    /// Snapshots of every registered job.
    pub async fn snapshots(&self) -> Vec<Job> {
        let machines: Vec<Arc<JobStateMachine>> =
            self.jobs.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(machines.len());
        for machine in machines {
            out.push(machine.snapshot().await);
        }
        out
    }

    /// Number of jobs not yet in a terminal state.
    pub async fn active_count(&self) -> usize {
        self.snapshots()
            .await
            .iter()
            .filter(|job| !job.is_terminal())
            .count()
    }
}
