//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 18;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Video codecs the invoker is allowed to pass to the external tool.
pub const ALLOWED_VIDEO_CODECS: &[&str] = &["libx264", "libx265"];
/// Audio codecs the invoker is allowed to pass to the external tool.
pub const ALLOWED_AUDIO_CODECS: &[&str] = &["aac", "libopus", "copy"];
/// x264/x265 presets accepted in a spec.
pub const ALLOWED_PRESETS: &[&str] = &[
    "ultrafast", "superfast", "veryfast", "faster", "fast", "medium", "slow", "slower", "veryslow",
];

/// Video encoding configuration.
///
/// Every field is checked against an allowlist or numeric range during spec
/// validation, so values reaching the command builder are always safe to
/// place in an argument vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g. "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g. "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }
}

impl EncodingConfig {
    /// Validate codec, preset, CRF, and bitrate against the allowlists.
    pub fn check(&self) -> Result<(), String> {
        if !ALLOWED_VIDEO_CODECS.contains(&self.codec.as_str()) {
            return Err(format!("unsupported video codec '{}'", self.codec));
        }
        if !ALLOWED_PRESETS.contains(&self.preset.as_str()) {
            return Err(format!("unsupported preset '{}'", self.preset));
        }
        if self.crf > 51 {
            return Err(format!("crf {} out of range 0-51", self.crf));
        }
        if !ALLOWED_AUDIO_CODECS.contains(&self.audio_codec.as_str()) {
            return Err(format!("unsupported audio codec '{}'", self.audio_codec));
        }
        if !is_valid_bitrate(&self.audio_bitrate) {
            return Err(format!("invalid audio bitrate '{}'", self.audio_bitrate));
        }
        Ok(())
    }

    /// Returns a new config with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// Convert to FFmpeg command arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
        ];
        if self.audio_codec != "copy" {
            args.push("-b:a".to_string());
            args.push(self.audio_bitrate.clone());
        }
        args
    }
}

/// Bitrates look like "128k" or "1500000": digits with an optional k/M suffix.
fn is_valid_bitrate(bitrate: &str) -> bool {
    let digits = bitrate
        .strip_suffix(&['k', 'K', 'm', 'M'][..])
        .unwrap_or(bitrate);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
