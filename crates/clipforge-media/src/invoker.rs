//! The transcoder invoker: typed parameters in, committed-ready artifact out.
//!
//! Retry policy lives here and nowhere else. Only this layer sees the
//! classified failure, so only this layer can know that a timeout earns a
//! few backed-off retries, an unclassified exit earns one, and bad input or
//! a missing binary earns none.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use clipforge_models::{EncodingConfig, OperationId, OperationSpec};

use crate::command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaResult, TranscodeError};
use crate::filters::{frame_filter, FilterSpec};
use crate::probe::{probe_video, MediaInfo};
use crate::retry::RetryPolicy;

/// Everything needed to run one operation against a staged input.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    /// Staged source video
    pub input: PathBuf,
    /// Scratch directory this invocation may write into
    pub scratch_dir: PathBuf,
    /// Operation identity, used for output naming and logging
    pub operation_id: OperationId,
    /// Validated transformation parameters
    pub params: OperationSpec,
    /// Job-level encoding defaults
    pub encoding: EncodingConfig,
}

/// Result of an invocation plus how many attempts it took.
#[derive(Debug)]
pub struct TranscodeOutcome {
    pub result: MediaResult<PathBuf>,
    pub attempts: u32,
}

/// The seam between the orchestrator and the external tool.
///
/// Production uses [`FfmpegTranscoder`]; tests inject scripted fakes to
/// exercise every failure path without a real binary.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run one operation to a terminal outcome, retries included.
    ///
    /// The returned path, when successful, points at a non-empty artifact
    /// inside `request.scratch_dir`.
    async fn run(
        &self,
        request: &TranscodeRequest,
        cancel: watch::Receiver<bool>,
    ) -> TranscodeOutcome;
}

/// Invoker configuration.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Minimum wall-clock budget per attempt
    pub timeout_floor: Duration,
    /// Maximum wall-clock budget per attempt
    pub timeout_ceiling: Duration,
    /// Budget per second of expected output duration
    pub timeout_factor: f64,
    /// Retries granted to a timed-out attempt
    pub max_timeout_retries: u32,
    /// Retries granted to an unclassified failure
    pub max_failed_retries: u32,
    /// Grace period before a cancelled child is killed
    pub kill_grace: Duration,
    /// Backoff schedule between attempts
    pub retry: RetryPolicy,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            timeout_floor: Duration::from_secs(60),
            timeout_ceiling: Duration::from_secs(1800),
            timeout_factor: 2.0,
            max_timeout_retries: 2,
            max_failed_retries: 1,
            kill_grace: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl InvokerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout_floor: env_secs("INVOKER_TIMEOUT_FLOOR_SECS", defaults.timeout_floor),
            timeout_ceiling: env_secs("INVOKER_TIMEOUT_CEILING_SECS", defaults.timeout_ceiling),
            timeout_factor: std::env::var("INVOKER_TIMEOUT_FACTOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_factor),
            max_timeout_retries: std::env::var("INVOKER_MAX_TIMEOUT_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_timeout_retries),
            max_failed_retries: std::env::var("INVOKER_MAX_FAILED_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_failed_retries),
            kill_grace: env_secs("INVOKER_KILL_GRACE_SECS", defaults.kill_grace),
            retry: RetryPolicy::default(),
        }
    }

    /// Wall-clock budget for one attempt producing `basis_secs` of output.
    pub fn timeout_for(&self, basis_secs: f64) -> Duration {
        if basis_secs <= 0.0 {
            return self.timeout_floor;
        }
        let scaled = Duration::from_secs_f64(basis_secs * self.timeout_factor);
        scaled.clamp(self.timeout_floor, self.timeout_ceiling)
    }
}

fn env_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Production invoker shelling out to FFmpeg.
pub struct FfmpegTranscoder {
    config: InvokerConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: InvokerConfig) -> Self {
        Self { config }
    }

    /// Additional attempts a failure class earns beyond the first.
    fn retry_budget(&self, err: &TranscodeError) -> u32 {
        match err {
            TranscodeError::Timeout(_) => self.config.max_timeout_retries,
            TranscodeError::Failed { .. } | TranscodeError::MissingOutput(_) => {
                self.config.max_failed_retries
            }
            _ => 0,
        }
    }

    async fn invoke_once(
        &self,
        request: &TranscodeRequest,
        probe: &MediaInfo,
        timeout: Duration,
        output: &Path,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<PathBuf> {
        let cmd = build_command(request, probe, output)?;

        let runner = FfmpegRunner::new()
            .with_timeout(timeout)
            .with_kill_grace(self.config.kill_grace)
            .with_cancel(cancel);
        runner.run(&cmd).await?;

        // Exit code 0 alone is not success; the artifact must exist and
        // contain data.
        let meta = tokio::fs::metadata(output)
            .await
            .map_err(|_| TranscodeError::MissingOutput(output.to_path_buf()))?;
        if meta.len() == 0 {
            return Err(TranscodeError::MissingOutput(output.to_path_buf()));
        }

        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(
        &self,
        request: &TranscodeRequest,
        cancel: watch::Receiver<bool>,
    ) -> TranscodeOutcome {
        if let Err(err) = check_ffmpeg() {
            return TranscodeOutcome {
                result: Err(err),
                attempts: 0,
            };
        }

        let probe = match probe_video(&request.input).await {
            Ok(info) => info,
            Err(err) => {
                return TranscodeOutcome {
                    result: Err(err),
                    attempts: 0,
                }
            }
        };

        let basis_secs = match trim_bounds(&request.params) {
            Ok(Some((_, duration))) => duration,
            Ok(None) => probe.duration,
            Err(err) => {
                return TranscodeOutcome {
                    result: Err(err),
                    attempts: 0,
                }
            }
        };
        let timeout = self.config.timeout_for(basis_secs);

        let output = request
            .scratch_dir
            .join(format!("{}.mp4", request.operation_id));

        let mut attempt = 0u32;
        loop {
            if *cancel.borrow() {
                return TranscodeOutcome {
                    result: Err(TranscodeError::Cancelled),
                    attempts: attempt,
                };
            }

            attempt += 1;
            debug!(
                operation_id = %request.operation_id,
                attempt,
                timeout_secs = timeout.as_secs(),
                "Invoking transcoder"
            );

            match self
                .invoke_once(request, &probe, timeout, &output, cancel.clone())
                .await
            {
                Ok(path) => {
                    return TranscodeOutcome {
                        result: Ok(path),
                        attempts: attempt,
                    }
                }
                Err(err) => {
                    let budget = self.retry_budget(&err);
                    if attempt > budget {
                        return TranscodeOutcome {
                            result: Err(err),
                            attempts: attempt,
                        };
                    }
                    warn!(
                        operation_id = %request.operation_id,
                        attempt,
                        budget,
                        "Transcode attempt failed, retrying: {}",
                        err
                    );
                    // Drop any partial artifact before the next attempt
                    let _ = tokio::fs::remove_file(&output).await;
                    tokio::time::sleep(self.config.retry.delay_for_attempt(attempt)).await;
                }
            }
        }
    }
}

/// Parse the request's trim bounds, if any.
///
/// Specs are validated before a job exists, so a parse failure here is an
/// internal inconsistency rather than user input.
fn trim_bounds(params: &OperationSpec) -> MediaResult<Option<(f64, f64)>> {
    match &params.trim {
        None => Ok(None),
        Some(trim) => trim
            .bounds()
            .map(Some)
            .map_err(|v| TranscodeError::failed(format!("unvalidated trim bounds: {}", v), None, None)),
    }
}

/// Assemble the argument set for one attempt.
fn build_command(
    request: &TranscodeRequest,
    probe: &MediaInfo,
    output: &Path,
) -> MediaResult<FfmpegCommand> {
    let mut cmd = FfmpegCommand::new(&request.input, output);
    let bounds = trim_bounds(&request.params)?;

    if request.params.copy_streams {
        // Accurate output-side seek: stream copy cannot cut on arbitrary
        // frames, so the trim goes after the input.
        if let Some((start, duration)) = bounds {
            cmd = cmd.output_seek(start).output_duration(duration);
        }
        return Ok(cmd.codec_copy());
    }

    if let Some((start, duration)) = bounds {
        cmd = cmd.seek(start).duration(duration);
    }

    match frame_filter(&request.params.frame, probe.width, probe.height) {
        Some(FilterSpec::Simple(filter)) => cmd = cmd.video_filter(filter),
        Some(FilterSpec::Complex(filter)) => cmd = cmd.filter_complex(filter),
        None => {}
    }

    Ok(cmd.encoding(request.params.effective_encoding(&request.encoding)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{FrameTransform, Trim, VerticalParams};

    fn request(params: OperationSpec) -> TranscodeRequest {
        TranscodeRequest {
            input: PathBuf::from("/storage/input/job.mp4"),
            scratch_dir: PathBuf::from("/storage/temp/job/op"),
            operation_id: OperationId::from_string("op-1"),
            params,
            encoding: EncodingConfig::default(),
        }
    }

    fn probe() -> MediaInfo {
        MediaInfo {
            duration: 300.0,
            width: 1920,
            height: 1080,
            codec: "h264".to_string(),
        }
    }

    #[test]
    fn test_timeout_scaling() {
        let config = InvokerConfig::default();
        // Floor wins for short clips
        assert_eq!(config.timeout_for(10.0), Duration::from_secs(60));
        // Proportional in the middle
        assert_eq!(config.timeout_for(120.0), Duration::from_secs(240));
        // Ceiling wins for very long inputs
        assert_eq!(config.timeout_for(7200.0), Duration::from_secs(1800));
        // Unknown duration falls back to the floor
        assert_eq!(config.timeout_for(0.0), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_budget_by_class() {
        let invoker = FfmpegTranscoder::new(InvokerConfig::default());
        assert_eq!(invoker.retry_budget(&TranscodeError::Timeout(60)), 2);
        assert_eq!(
            invoker.retry_budget(&TranscodeError::failed("exit 1", None, Some(1))),
            1
        );
        assert_eq!(
            invoker.retry_budget(&TranscodeError::InvalidMedia("moov atom not found".into())),
            0
        );
        assert_eq!(invoker.retry_budget(&TranscodeError::ToolUnavailable), 0);
        assert_eq!(invoker.retry_budget(&TranscodeError::Cancelled), 0);
    }

    #[test]
    fn test_build_command_encode_path() {
        let params = OperationSpec {
            trim: Some(Trim {
                start: "00:00:10".to_string(),
                end: "00:00:40".to_string(),
            }),
            frame: FrameTransform::Vertical(VerticalParams::default()),
            encoding: None,
            copy_streams: false,
        };
        let cmd = build_command(&request(params), &probe(), Path::new("/tmp/out.mp4")).unwrap();
        let args = cmd.build_args();

        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"10.000".to_string()));
        assert!(args.contains(&"-t".to_string()));
        assert!(args.contains(&"30.000".to_string()));
        assert!(args.contains(&"-filter_complex".to_string()));
        assert!(args.contains(&"-c:v".to_string()));
    }

    #[test]
    fn test_build_command_copy_path() {
        let params = OperationSpec {
            trim: Some(Trim {
                start: "5".to_string(),
                end: "15".to_string(),
            }),
            frame: FrameTransform::Keep,
            encoding: None,
            copy_streams: true,
        };
        let cmd = build_command(&request(params), &probe(), Path::new("/tmp/out.mp4")).unwrap();
        let args = cmd.build_args();

        assert!(args.contains(&"copy".to_string()));
        assert!(args.contains(&"make_zero".to_string()));
        // No encode arguments on the copy path
        assert!(!args.contains(&"-c:v".to_string()));
        assert!(!args.contains(&"-crf".to_string()));
        // Seek sits after the input for accuracy
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        assert!(ss_pos > i_pos);
    }

    #[test]
    fn test_build_command_whole_source() {
        let params = OperationSpec {
            trim: None,
            frame: FrameTransform::Keep,
            encoding: None,
            copy_streams: false,
        };
        let cmd = build_command(&request(params), &probe(), Path::new("/tmp/out.mp4")).unwrap();
        let args = cmd.build_args();

        assert!(!args.contains(&"-ss".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
        assert!(args.contains(&"-c:v".to_string()));
    }
}
