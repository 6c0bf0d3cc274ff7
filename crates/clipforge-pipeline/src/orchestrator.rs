//! The pipeline orchestrator.
//!
//! `submit` validates the spec before touching storage, stages the upload
//! synchronously, then drives processing asynchronously: one driver task per
//! job dispatches operations through a semaphore shared by every job, and a
//! barrier at the end computes the terminal status from operation outcomes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use metrics::{counter, gauge};
use scopeguard::defer;
use tokio::io::AsyncRead;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use clipforge_media::{TranscodeError, TranscodeRequest, Transcoder};
use clipforge_models::{
    EncodingConfig, ErrorKind, Job, JobError, JobId, JobSpec, JobStatus, Operation,
    OperationStatus,
};
use clipforge_storage::{validate_extension, StorageManager};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::state::{JobRegistry, JobStateMachine};
use crate::store::JobStore;

/// Coordinates storage, the invoker, and the state machines.
pub struct Orchestrator {
    config: PipelineConfig,
    storage: Arc<StorageManager>,
    transcoder: Arc<dyn Transcoder>,
    registry: Arc<JobRegistry>,
    store: Arc<dyn JobStore>,
    permits: Arc<Semaphore>,
    accepting: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        storage: Arc<StorageManager>,
        transcoder: Arc<dyn Transcoder>,
        store: Arc<dyn JobStore>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_operations));
        let registry = Arc::new(JobRegistry::new(Arc::clone(&store)));
        Self {
            config,
            storage,
            transcoder,
            registry,
            store,
            permits,
            accepting: AtomicBool::new(true),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    /// Whether the pool is accepting new work. Reported by the liveness
    /// endpoint; flipped off during shutdown.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting new submissions.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Free slots in the operation pool.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Accept an upload: validate, create the job, stage synchronously,
    /// process asynchronously.
    ///
    /// Only `InvalidSpec` (including a rejected filename) prevents job
    /// creation; a staging failure yields a job observable in `failed`.
    pub async fn submit<R>(
        self: &Arc<Self>,
        filename: &str,
        spec: JobSpec,
        upload: R,
    ) -> PipelineResult<JobId>
    where
        R: AsyncRead + Unpin + Send,
    {
        // Fail fast, before any storage or job state exists
        spec.validate(self.config.max_operations_per_job)
            .map_err(|v| PipelineError::InvalidSpec(v.0))?;
        let extension =
            validate_extension(filename).map_err(|e| PipelineError::InvalidSpec(e.to_string()))?;

        let job = Job::new(&spec);
        let job_id = job.id.clone();
        let logger = JobLogger::new(&job_id, "pipeline");
        let machine = self.registry.insert(job).await;
        counter!("clipforge_jobs_submitted_total").increment(1);
        logger.log_start(&format!("{} operations queued", spec.operations.len()));

        if machine.transition(JobStatus::Staging).await.is_err() {
            // Cancelled between creation and staging
            return Ok(job_id);
        }

        match self.storage.stage(&job_id, &extension, upload).await {
            Ok(path) => machine.set_source(path).await,
            Err(e) => {
                logger.log_error(&format!("staging failed: {}", e));
                let error = JobError::new(e.kind(), e.to_string());
                let _ = machine.conclude(JobStatus::Failed, Some(error)).await;
                counter!("clipforge_jobs_failed_total").increment(1);
                return Ok(job_id);
            }
        }

        if machine.transition(JobStatus::Processing).await.is_err() {
            // Cancelled during staging; drop the staged input
            self.cleanup_job_files(&job_id).await;
            return Ok(job_id);
        }

        let this = Arc::clone(self);
        let machine = Arc::clone(&machine);
        tokio::spawn(async move {
            this.drive_job(machine).await;
        });

        Ok(job_id)
    }

    /// Current snapshot of a job, falling back to the durable store for
    /// records that survived a restart.
    pub async fn status(&self, id: &JobId) -> PipelineResult<Job> {
        if let Some(machine) = self.registry.get(id).await {
            return Ok(machine.snapshot().await);
        }
        self.store
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(id.clone()))
    }

    /// Request cooperative cancellation.
    ///
    /// Idempotent: cancelling a terminal job acknowledges without effect.
    /// Not-yet-started operations are never dispatched afterwards; running
    /// ones get the configured grace period before their child is killed.
    pub async fn cancel(&self, id: &JobId) -> PipelineResult<Job> {
        let machine = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| PipelineError::NotFound(id.clone()))?;

        machine.request_cancel();

        let snapshot = machine.snapshot().await;
        match snapshot.status {
            status if status.is_terminal() => Ok(snapshot),
            JobStatus::Processing => Ok(snapshot), // the driver observes the flag
            JobStatus::Queued | JobStatus::Staging => {
                // No driver exists yet for these states; conclude here. If
                // submit wins the race instead, the flag still stops it.
                match machine.conclude(JobStatus::Cancelled, None).await {
                    Ok(job) => {
                        self.cleanup_job_files(id).await;
                        counter!("clipforge_jobs_cancelled_total").increment(1);
                        Ok(job)
                    }
                    Err(_) => Ok(machine.snapshot().await),
                }
            }
            _ => Ok(snapshot),
        }
    }

    /// Remove a terminal job: its outputs, its record, and any leftovers.
    pub async fn delete(&self, id: &JobId) -> PipelineResult<()> {
        let snapshot = self.status(id).await?;
        if !snapshot.is_terminal() {
            return Err(PipelineError::NotTerminal(id.clone()));
        }

        self.storage.remove_outputs(id).await?;
        self.cleanup_job_files(id).await;
        self.registry.remove(id).await?;
        Ok(())
    }

    /// Drive one job from `processing` to its terminal state.
    async fn drive_job(self: Arc<Self>, machine: Arc<JobStateMachine>) {
        let job = machine.snapshot().await;
        let job_id = job.id.clone();
        let logger = JobLogger::new(&job_id, "pipeline");

        let Some(source) = job.source.clone() else {
            // Unreachable if submit staged correctly
            logger.log_error("job entered processing without a staged source");
            self.cleanup_job_files(&job_id).await;
            let error = JobError::new(ErrorKind::IoFault, "staged input missing");
            let _ = machine.conclude(JobStatus::Failed, Some(error)).await;
            return;
        };

        let fatal: Arc<Mutex<Option<JobError>>> = Arc::new(Mutex::new(None));
        let fatal_flag = Arc::new(AtomicBool::new(false));
        let mut cancel_rx = machine.cancel_receiver();
        let mut join_set = JoinSet::new();

        for op in job
            .operations
            .iter()
            .filter(|op| op.status == OperationStatus::Pending)
        {
            if fatal_flag.load(Ordering::SeqCst) || machine.is_cancel_requested() {
                break;
            }

            // Block this job's dispatch, never the submitter, until the
            // shared pool frees a slot
            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = wait_cancelled(&mut cancel_rx) => break,
            };
            if fatal_flag.load(Ordering::SeqCst) {
                break;
            }

            let this = Arc::clone(&self);
            let machine = Arc::clone(&machine);
            let op = op.clone();
            let source = source.clone();
            let encoding = job.encoding.clone();
            let fatal = Arc::clone(&fatal);
            let fatal_flag = Arc::clone(&fatal_flag);
            join_set.spawn(async move {
                let _permit = permit;
                this.run_operation(machine, op, source, encoding, fatal_flag, fatal)
                    .await;
            });
        }

        // Barrier: the terminal status exists only once every dispatched
        // operation has reached its own terminal state
        while join_set.join_next().await.is_some() {}

        let snapshot = machine.snapshot().await;
        let fatal_error = fatal.lock().await.take();
        let (terminal, error) = terminal_outcome(
            &snapshot,
            fatal_error,
            machine.is_cancel_requested(),
        );

        // Cleanup is owed on every path; temp and staged input are gone by
        // the time the job is terminal
        self.cleanup_job_files(&job_id).await;

        match machine.conclude(terminal, error).await {
            Ok(job) => {
                let metric = match job.status {
                    JobStatus::Completed => "clipforge_jobs_completed_total",
                    JobStatus::Partial => "clipforge_jobs_partial_total",
                    JobStatus::Cancelled => "clipforge_jobs_cancelled_total",
                    _ => "clipforge_jobs_failed_total",
                };
                counter!(metric).increment(1);
                logger.log_completion(&format!(
                    "terminal status {} ({}/{} operations succeeded)",
                    job.status,
                    job.succeeded_count(),
                    job.operations.len()
                ));
            }
            Err(e) => logger.log_error(&format!("terminal transition rejected: {}", e)),
        }
    }

    /// Run one operation to its terminal state. Scratch space is purged on
    /// every exit path.
    async fn run_operation(
        &self,
        machine: Arc<JobStateMachine>,
        op: Operation,
        source: PathBuf,
        encoding: EncodingConfig,
        fatal_flag: Arc<AtomicBool>,
        fatal: Arc<Mutex<Option<JobError>>>,
    ) {
        // Cooperative cancellation point: a not-yet-started operation is
        // never invoked
        if machine.is_cancel_requested() || fatal_flag.load(Ordering::SeqCst) {
            return;
        }

        if machine.operation_running(&op.id).await.is_err() {
            return;
        }

        gauge!("clipforge_operations_inflight").increment(1.0);
        defer! {
            gauge!("clipforge_operations_inflight").decrement(1.0);
        }

        let scratch = match self.storage.operation_scratch(&op.job_id, &op.id).await {
            Ok(dir) => dir,
            Err(e) => {
                let error = JobError::new(e.kind(), e.to_string());
                let _ = machine.operation_failed(&op.id, error, 0).await;
                return;
            }
        };

        let scratch_guard = scratch.clone();
        defer! {
            let _ = std::fs::remove_dir_all(&scratch_guard);
        }

        let request = TranscodeRequest {
            input: source,
            scratch_dir: scratch,
            operation_id: op.id.clone(),
            params: op.params.clone(),
            encoding,
        };

        debug!(job_id = %op.job_id, operation_id = %op.id, "Dispatching operation");
        let outcome = self
            .transcoder
            .run(&request, machine.cancel_receiver())
            .await;

        match outcome.result {
            Ok(artifact) => match self.storage.commit(&artifact, &op.job_id, &op.id).await {
                Ok(dest) => {
                    let _ = machine
                        .operation_succeeded(&op.id, dest, outcome.attempts)
                        .await;
                }
                Err(e) => {
                    warn!(
                        job_id = %op.job_id,
                        operation_id = %op.id,
                        "Commit failed: {}", e
                    );
                    let error = JobError::new(e.kind(), e.to_string());
                    let _ = machine
                        .operation_failed(&op.id, error, outcome.attempts)
                        .await;
                }
            },
            Err(err) => {
                if matches!(err, TranscodeError::ToolUnavailable) {
                    // Environment-fatal: no point running the rest of the job
                    fatal_flag.store(true, Ordering::SeqCst);
                    *fatal.lock().await =
                        Some(JobError::new(ErrorKind::ToolUnavailable, err.detail()));
                }
                warn!(
                    job_id = %op.job_id,
                    operation_id = %op.id,
                    attempts = outcome.attempts,
                    "Operation failed: {}", err
                );
                let error = JobError::new(err.kind(), err.detail());
                let _ = machine
                    .operation_failed(&op.id, error, outcome.attempts)
                    .await;
            }
        }
    }

    /// Remove the job's temp subtree and staged input. Idempotent and
    /// best-effort; failures are logged, never propagated.
    async fn cleanup_job_files(&self, job_id: &JobId) {
        if let Err(e) = self.storage.purge(job_id).await {
            warn!(job_id = %job_id, "Temp purge failed: {}", e);
        }
        if let Err(e) = self.storage.discard_input(job_id).await {
            warn!(job_id = %job_id, "Input discard failed: {}", e);
        }
    }
}

/// The terminal-status rule from the operation outcomes.
fn terminal_outcome(
    job: &Job,
    fatal: Option<JobError>,
    cancel_requested: bool,
) -> (JobStatus, Option<JobError>) {
    if let Some(error) = fatal {
        return (JobStatus::Failed, Some(error));
    }
    if cancel_requested {
        return (JobStatus::Cancelled, None);
    }

    let total = job.operations.len();
    let failed = job.failed_count();
    let succeeded = job.succeeded_count();

    if failed == 0 {
        (JobStatus::Completed, None)
    } else if succeeded == 0 {
        let first = first_operation_error(job);
        (
            JobStatus::Failed,
            Some(JobError::new(
                first.kind,
                format!("all {} operations failed: {}", total, first.detail),
            )),
        )
    } else {
        let first = first_operation_error(job);
        (
            JobStatus::Partial,
            Some(JobError::new(
                first.kind,
                format!("{} of {} operations failed", failed, total),
            )),
        )
    }
}

fn first_operation_error(job: &Job) -> JobError {
    job.operations
        .iter()
        .filter(|op| op.status == OperationStatus::Failed)
        .find_map(|op| op.error.clone())
        .unwrap_or_else(|| JobError::new(ErrorKind::TranscodeFailed, "operation failed"))
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without a cancel; never fires
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{FrameTransform, OperationSpec};

    fn job_with_outcomes(outcomes: &[OperationStatus]) -> Job {
        let spec = JobSpec {
            operations: outcomes
                .iter()
                .map(|_| OperationSpec {
                    trim: None,
                    frame: FrameTransform::Keep,
                    encoding: None,
                    copy_streams: false,
                })
                .collect(),
            encoding: EncodingConfig::default(),
        };
        let mut job = Job::new(&spec);
        for (op, status) in job.operations.iter_mut().zip(outcomes) {
            op.status = *status;
            if *status == OperationStatus::Failed {
                op.error = Some(JobError::new(ErrorKind::InvalidMedia, "bad input"));
            }
        }
        job
    }

    #[test]
    fn test_terminal_rule_all_succeeded() {
        use OperationStatus::*;
        let job = job_with_outcomes(&[Succeeded, Succeeded]);
        let (status, error) = terminal_outcome(&job, None, false);
        assert_eq!(status, JobStatus::Completed);
        assert!(error.is_none());
    }

    #[test]
    fn test_terminal_rule_all_failed() {
        use OperationStatus::*;
        let job = job_with_outcomes(&[Failed, Failed]);
        let (status, error) = terminal_outcome(&job, None, false);
        assert_eq!(status, JobStatus::Failed);
        assert_eq!(error.unwrap().kind, ErrorKind::InvalidMedia);
    }

    #[test]
    fn test_terminal_rule_mixed_is_partial() {
        use OperationStatus::*;
        let job = job_with_outcomes(&[Succeeded, Failed, Succeeded]);
        let (status, error) = terminal_outcome(&job, None, false);
        assert_eq!(status, JobStatus::Partial);
        let error = error.unwrap();
        assert_eq!(error.kind, ErrorKind::InvalidMedia);
        assert!(error.detail.contains("1 of 3"));
    }

    #[test]
    fn test_terminal_rule_fatal_overrides() {
        use OperationStatus::*;
        let job = job_with_outcomes(&[Succeeded, Failed]);
        let fatal = JobError::new(ErrorKind::ToolUnavailable, "ffmpeg missing");
        let (status, error) = terminal_outcome(&job, Some(fatal), false);
        assert_eq!(status, JobStatus::Failed);
        assert_eq!(error.unwrap().kind, ErrorKind::ToolUnavailable);
    }

    #[test]
    fn test_terminal_rule_cancel_overrides_counts() {
        use OperationStatus::*;
        let job = job_with_outcomes(&[Succeeded, Pending]);
        let (status, error) = terminal_outcome(&job, None, true);
        assert_eq!(status, JobStatus::Cancelled);
        assert!(error.is_none());
    }
}
