//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use clipforge_models::EncodingConfig;

use crate::classify::classify_failure;
use crate::error::{MediaResult, TranscodeError};

/// How many trailing stderr lines are kept for failure classification.
const STDERR_TAIL_LINES: usize = 64;

/// Builder for FFmpeg commands.
///
/// Arguments are always discrete, typed values; nothing here passes through
/// a shell or interpolates free-form user text.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input, fast seek).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Set seek position after the input (accurate seek, for stream copy).
    pub fn output_seek(self, seconds: f64) -> Self {
        self.output_arg("-ss").output_arg(format!("{:.3}", seconds))
    }

    /// Set duration after the input.
    pub fn output_duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Apply an encoding configuration.
    pub fn encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.to_ffmpeg_args())
    }

    /// Remux without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_args(["-c", "copy", "-avoid_negative_ts", "make_zero"])
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with timeout and cancellation.
pub struct FfmpegRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Wall-clock timeout
    timeout: Option<Duration>,
    /// How long a cancelled process may keep running before being killed
    kill_grace: Duration,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            timeout: None,
            kill_grace: Duration::from_secs(5),
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the cancellation grace period.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Run an FFmpeg command to completion.
    ///
    /// A zero exit is success. Non-zero exits are classified from the
    /// captured stderr tail; timeouts and cancellations kill the child.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscodeError::ToolUnavailable
                } else {
                    TranscodeError::Io(e)
                }
            })?;

        let stderr = child.stderr.take().expect("stderr not captured");
        let tail_handle = tokio::spawn(capture_stderr_tail(stderr));

        let wait_result = self.wait_for_exit(&mut child).await;

        let stderr_tail = tail_handle.await.unwrap_or_default();
        let status = wait_result?;

        if status.success() {
            Ok(())
        } else {
            Err(classify_failure(&stderr_tail, status.code()))
        }
    }

    /// Wait for the child, honoring timeout and cancellation.
    async fn wait_for_exit(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let timeout_fired = async {
            match self.timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };

        let cancel_requested = async {
            match self.cancel_rx.clone() {
                Some(mut rx) => loop {
                    if *rx.borrow() {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        // Sender dropped without cancelling; never fires.
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            status = child.wait() => Ok(status?),
            _ = timeout_fired => {
                let secs = self.timeout.map(|d| d.as_secs()).unwrap_or_default();
                warn!("FFmpeg timed out after {}s, killing process", secs);
                let _ = child.kill().await;
                Err(TranscodeError::Timeout(secs))
            }
            _ = cancel_requested => {
                info!(
                    "Cancellation requested, allowing {:?} for natural completion",
                    self.kill_grace
                );
                match tokio::time::timeout(self.kill_grace, child.wait()).await {
                    Ok(status) => Ok(status?),
                    Err(_) => {
                        let _ = child.kill().await;
                        Err(TranscodeError::Cancelled)
                    }
                }
            }
        }
    }
}

/// Collect the last [`STDERR_TAIL_LINES`] lines of the child's stderr.
async fn capture_stderr_tail(stderr: ChildStderr) -> String {
    let mut reader = BufReader::new(stderr).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = reader.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| TranscodeError::ToolUnavailable)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| TranscodeError::ToolUnavailable)
}
