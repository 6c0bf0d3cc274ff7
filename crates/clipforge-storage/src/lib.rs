//! Filesystem storage manager for the ClipForge pipeline.
//!
//! Owns three directories-as-namespaces:
//! - `input` — staged uploads, one file per job
//! - `temp` — per-job scratch trees for in-progress transcodes
//! - `output` — committed artifacts, addressable purely by ids
//!
//! Directories are partitioned by job id, so concurrent jobs never contend;
//! serialization of same-job calls is the orchestrator's responsibility.

pub mod error;
pub mod fs;

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use clipforge_models::{JobId, OperationId};

pub use error::{StorageError, StorageResult};

/// Upload extensions accepted for staging.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v",
];

/// Default upload ceiling: 500 MB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500_000_000;

const STAGE_BUF_BYTES: usize = 64 * 1024;

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Staged upload namespace
    pub input_dir: PathBuf,
    /// Committed artifact namespace
    pub output_dir: PathBuf,
    /// Scratch namespace
    pub temp_dir: PathBuf,
    /// Size ceiling enforced mid-write during staging
    pub max_upload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./storage/input"),
            output_dir: PathBuf::from("./storage/output"),
            temp_dir: PathBuf::from("./storage/temp"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            input_dir: env_path("STORAGE_INPUT_DIR", defaults.input_dir),
            output_dir: env_path("STORAGE_OUTPUT_DIR", defaults.output_dir),
            temp_dir: env_path("STORAGE_TEMP_DIR", defaults.temp_dir),
            max_upload_bytes: std::env::var("STORAGE_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
        }
    }
}

fn env_path(var: &str, default: PathBuf) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or(default)
}

/// Validate an upload filename extension against the allowlist, returning
/// the normalized extension.
pub fn validate_extension(filename: &str) -> StorageResult<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(StorageError::UnsupportedExtension(ext))
    }
}

/// Owner of the `input`/`output`/`temp` namespaces.
pub struct StorageManager {
    config: StorageConfig,
}

impl StorageManager {
    /// Create the manager, ensuring all three roots exist.
    pub fn new(config: StorageConfig) -> StorageResult<Self> {
        std::fs::create_dir_all(&config.input_dir)?;
        std::fs::create_dir_all(&config.output_dir)?;
        std::fs::create_dir_all(&config.temp_dir)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Stream an upload into the job's input slot.
    ///
    /// The size ceiling is enforced while writing; an oversized or failed
    /// upload never leaves a partial file behind.
    pub async fn stage<R>(
        &self,
        job_id: &JobId,
        extension: &str,
        mut reader: R,
    ) -> StorageResult<PathBuf>
    where
        R: AsyncRead + Unpin,
    {
        let path = self.config.input_dir.join(format!("{}.{}", job_id, extension));

        let result = self.write_bounded(&path, &mut reader).await;
        match result {
            Ok(written) => {
                debug!(job_id = %job_id, bytes = written, "Staged upload at {}", path.display());
                Ok(path)
            }
            Err(err) => {
                // Never leave a partial upload behind
                let _ = tokio::fs::remove_file(&path).await;
                Err(err)
            }
        }
    }

    async fn write_bounded<R>(&self, path: &Path, reader: &mut R) -> StorageResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut file = tokio::fs::File::create(path).await?;
        let mut buf = vec![0u8; STAGE_BUF_BYTES];
        let mut written: u64 = 0;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            written += n as u64;
            if written > self.config.max_upload_bytes {
                return Err(StorageError::QuotaExceeded {
                    limit: self.config.max_upload_bytes,
                });
            }
            file.write_all(&buf[..n]).await?;
        }

        file.flush().await?;
        Ok(written)
    }

    /// Allocate the job's scratch directory. Idempotent per job.
    pub async fn scratch(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        let dir = self.config.temp_dir.join(job_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Allocate a per-operation subtree of the job's scratch directory.
    pub async fn operation_scratch(
        &self,
        job_id: &JobId,
        operation_id: &OperationId,
    ) -> StorageResult<PathBuf> {
        let dir = self
            .config
            .temp_dir
            .join(job_id.as_str())
            .join(operation_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// The committed artifact path for an operation.
    ///
    /// A pure function of the two ids: retrieval never depends on anything
    /// but identity, and distinct operations can never collide.
    pub fn output_path(&self, job_id: &JobId, operation_id: &OperationId) -> PathBuf {
        self.config
            .output_dir
            .join(job_id.as_str())
            .join(format!("{}.mp4", operation_id))
    }

    /// Atomically move a finished artifact from scratch into output.
    ///
    /// Fails with [`StorageError::Collision`] if the destination already
    /// exists; ids are unique per attempt, so a collision is a logic fault.
    pub async fn commit(
        &self,
        artifact: &Path,
        job_id: &JobId,
        operation_id: &OperationId,
    ) -> StorageResult<PathBuf> {
        if !tokio::fs::try_exists(artifact).await? {
            return Err(StorageError::NotFound(artifact.to_path_buf()));
        }

        let dest = self.output_path(job_id, operation_id);
        if tokio::fs::try_exists(&dest).await? {
            return Err(StorageError::Collision(dest));
        }

        fs::move_file(artifact, &dest).await?;
        debug!(
            job_id = %job_id,
            operation_id = %operation_id,
            "Committed artifact to {}",
            dest.display()
        );
        Ok(dest)
    }

    /// Remove the job's entire scratch subtree. Idempotent; called on both
    /// success and failure paths.
    pub async fn purge(&self, job_id: &JobId) -> StorageResult<()> {
        let dir = self.config.temp_dir.join(job_id.as_str());
        remove_dir_idempotent(&dir).await
    }

    /// Remove one operation's scratch subtree. Idempotent.
    pub async fn purge_operation(
        &self,
        job_id: &JobId,
        operation_id: &OperationId,
    ) -> StorageResult<()> {
        let dir = self
            .config
            .temp_dir
            .join(job_id.as_str())
            .join(operation_id.as_str());
        remove_dir_idempotent(&dir).await
    }

    /// Remove the job's staged input. Idempotent.
    pub async fn discard_input(&self, job_id: &JobId) -> StorageResult<()> {
        let prefix = format!("{}.", job_id);
        let mut entries = tokio::fs::read_dir(&self.config.input_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(&prefix)
            {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(StorageError::from(e));
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove all committed artifacts for a job. Idempotent; used by the
    /// retention reaper and explicit cleanup.
    pub async fn remove_outputs(&self, job_id: &JobId) -> StorageResult<()> {
        let dir = self.config.output_dir.join(job_id.as_str());
        remove_dir_idempotent(&dir).await
    }
}

async fn remove_dir_idempotent(dir: &Path) -> StorageResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!("Failed to remove {}: {}", dir.display(), e);
            Err(StorageError::from(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(root: &Path, max_bytes: u64) -> StorageManager {
        StorageManager::new(StorageConfig {
            input_dir: root.join("input"),
            output_dir: root.join("output"),
            temp_dir: root.join("temp"),
            max_upload_bytes: max_bytes,
        })
        .unwrap()
    }

    #[test]
    fn test_validate_extension() {
        assert_eq!(validate_extension("clip.MP4").unwrap(), "mp4");
        assert_eq!(validate_extension("video.webm").unwrap(), "webm");
        assert!(validate_extension("notes.txt").is_err());
        assert!(validate_extension("no_extension").is_err());
    }

    #[tokio::test]
    async fn test_stage_writes_job_scoped_file() {
        let root = TempDir::new().unwrap();
        let storage = manager(root.path(), 1024);
        let job_id = JobId::from_string("job-a");

        let path = storage
            .stage(&job_id, "mp4", &b"0123456789"[..])
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "job-a.mp4");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_stage_quota_removes_partial() {
        let root = TempDir::new().unwrap();
        let storage = manager(root.path(), 8);
        let job_id = JobId::from_string("job-b");

        let err = storage
            .stage(&job_id, "mp4", &b"way more than eight bytes"[..])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::QuotaExceeded { limit: 8 }));
        let staged = root.path().join("input").join("job-b.mp4");
        assert!(!staged.exists(), "partial upload must be removed");
    }

    #[tokio::test]
    async fn test_output_path_is_pure_function_of_ids() {
        let root = TempDir::new().unwrap();
        let storage = manager(root.path(), 1024);
        let job_id = JobId::from_string("job-c");
        let op_id = OperationId::from_string("op-1");

        let a = storage.output_path(&job_id, &op_id);
        let b = storage.output_path(&job_id, &op_id);
        assert_eq!(a, b);
        assert!(a.ends_with("job-c/op-1.mp4"));
    }

    #[tokio::test]
    async fn test_commit_moves_artifact_and_rejects_collision() {
        let root = TempDir::new().unwrap();
        let storage = manager(root.path(), 1024);
        let job_id = JobId::from_string("job-d");
        let op_id = OperationId::from_string("op-1");

        let scratch = storage.operation_scratch(&job_id, &op_id).await.unwrap();
        let artifact = scratch.join("out.mp4");
        tokio::fs::write(&artifact, b"encoded").await.unwrap();

        let dest = storage.commit(&artifact, &job_id, &op_id).await.unwrap();
        assert!(dest.exists());
        assert!(!artifact.exists());

        // Second commit with the same ids collides
        let again = scratch.join("out2.mp4");
        tokio::fs::write(&again, b"other").await.unwrap();
        let err = storage.commit(&again, &job_id, &op_id).await.unwrap_err();
        assert!(matches!(err, StorageError::Collision(_)));
        // Original artifact is untouched
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"encoded");
    }

    #[tokio::test]
    async fn test_commit_missing_artifact_fails() {
        let root = TempDir::new().unwrap();
        let storage = manager(root.path(), 1024);
        let job_id = JobId::from_string("job-e");
        let op_id = OperationId::from_string("op-1");

        let err = storage
            .commit(Path::new("/nonexistent/out.mp4"), &job_id, &op_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_purge_is_idempotent_and_total() {
        let root = TempDir::new().unwrap();
        let storage = manager(root.path(), 1024);
        let job_id = JobId::from_string("job-f");
        let op_id = OperationId::from_string("op-1");

        let scratch = storage.operation_scratch(&job_id, &op_id).await.unwrap();
        tokio::fs::write(scratch.join("partial.mp4"), b"junk")
            .await
            .unwrap();

        storage.purge(&job_id).await.unwrap();
        assert!(!root.path().join("temp").join("job-f").exists());

        // Purging again is fine
        storage.purge(&job_id).await.unwrap();
        storage.purge_operation(&job_id, &op_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_input_is_idempotent() {
        let root = TempDir::new().unwrap();
        let storage = manager(root.path(), 1024);
        let job_id = JobId::from_string("job-g");

        storage.stage(&job_id, "mkv", &b"data"[..]).await.unwrap();
        storage.discard_input(&job_id).await.unwrap();
        assert!(!root.path().join("input").join("job-g.mkv").exists());

        storage.discard_input(&job_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_scratch_is_idempotent() {
        let root = TempDir::new().unwrap();
        let storage = manager(root.path(), 1024);
        let job_id = JobId::from_string("job-h");

        let a = storage.scratch(&job_id).await.unwrap();
        let b = storage.scratch(&job_id).await.unwrap();
        assert_eq!(a, b);
        assert!(a.exists());
    }
}
