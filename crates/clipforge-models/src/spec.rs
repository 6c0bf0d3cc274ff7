//! Job specification and validation.
//!
//! A [`JobSpec`] describes the derivative clips a caller wants from one
//! source video. Validation runs before any job state is created; everything
//! downstream (command building included) may assume the ranges checked here.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::encoding::EncodingConfig;
use crate::timecode::parse_timecode;

/// Upper bound on operations per job.
pub const MAX_OPERATIONS_PER_JOB: usize = 16;
/// Longest clip a single operation may produce, in seconds.
pub const MAX_CLIP_SECS: f64 = 4.0 * 3600.0;
/// Largest accepted crop dimension or offset, in pixels.
pub const MAX_FRAME_PIXELS: u32 = 7680;

/// A spec that failed validation. The message is safe to return to callers.
#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct SpecViolation(pub String);

impl SpecViolation {
    fn at(index: usize, msg: impl Into<String>) -> Self {
        Self(format!("operation {}: {}", index, msg.into()))
    }
}

/// Request to produce one or more derivative clips from a source video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSpec {
    /// Operations to run, in order. Order determines output naming.
    pub operations: Vec<OperationSpec>,

    /// Job-level encoding defaults, overridable per operation.
    #[serde(default)]
    pub encoding: EncodingConfig,
}

/// One concrete transcoding unit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationSpec {
    /// Time range to keep. Absent means the whole source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim: Option<Trim>,

    /// Spatial transform applied to the frame.
    #[serde(default)]
    pub frame: FrameTransform,

    /// Per-operation encoding override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<EncodingConfig>,

    /// Remux without re-encoding (`-c copy`). Only valid for plain trims.
    #[serde(default)]
    pub copy_streams: bool,
}

/// Inclusive-start, exclusive-end trim bounds as timecodes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Trim {
    /// Start timecode (`HH:MM:SS(.mmm)`, `MM:SS`, or bare seconds)
    pub start: String,
    /// End timecode, same formats
    pub end: String,
}

impl Trim {
    /// Parse and range-check the bounds, returning (start, duration) seconds.
    pub fn bounds(&self) -> Result<(f64, f64), SpecViolation> {
        let start = parse_timecode(&self.start)
            .map_err(|e| SpecViolation(e.to_string()))?;
        let end = parse_timecode(&self.end)
            .map_err(|e| SpecViolation(e.to_string()))?;
        if end <= start {
            return Err(SpecViolation(format!(
                "trim end {} is not after start {}",
                self.end, self.start
            )));
        }
        let duration = end - start;
        if duration > MAX_CLIP_SECS {
            return Err(SpecViolation(format!(
                "trim spans {:.0}s, exceeding the {:.0}s limit",
                duration, MAX_CLIP_SECS
            )));
        }
        Ok((start, duration))
    }
}

/// Spatial transform for an operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameTransform {
    /// Leave the frame untouched
    #[default]
    Keep,
    /// Crop to an explicit pixel region of the source
    Crop(CropRegion),
    /// Convert to 9:16 portrait with a blurred self-background
    Vertical(VerticalParams),
}

/// Pixel-region crop, origin top-left of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CropRegion {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
}

impl CropRegion {
    fn check(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("crop region must have non-zero dimensions".to_string());
        }
        let right = self.x.saturating_add(self.width);
        let bottom = self.y.saturating_add(self.height);
        if right > MAX_FRAME_PIXELS || bottom > MAX_FRAME_PIXELS {
            return Err(format!(
                "crop region extends past {}px bound",
                MAX_FRAME_PIXELS
            ));
        }
        Ok(())
    }
}

/// Parameters for the vertical blurred-background conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct VerticalParams {
    /// How much the foreground video is enlarged relative to the 1080px
    /// canvas width (1.0 = fit width exactly).
    #[serde(default = "default_scale_factor")]
    #[validate(range(min = 1.0, max = 2.0))]
    pub scale_factor: f64,
}

fn default_scale_factor() -> f64 {
    1.2
}

impl Default for VerticalParams {
    fn default() -> Self {
        Self {
            scale_factor: default_scale_factor(),
        }
    }
}

impl JobSpec {
    /// Validate the whole spec against `max_operations`.
    ///
    /// Returns the first violation found; the orchestrator rejects the
    /// request with `InvalidSpec` before creating any job state.
    pub fn validate(&self, max_operations: usize) -> Result<(), SpecViolation> {
        if self.operations.is_empty() {
            return Err(SpecViolation("spec contains no operations".to_string()));
        }
        if self.operations.len() > max_operations {
            return Err(SpecViolation(format!(
                "spec contains {} operations, limit is {}",
                self.operations.len(),
                max_operations
            )));
        }
        self.encoding
            .check()
            .map_err(SpecViolation)?;

        for (index, op) in self.operations.iter().enumerate() {
            op.check().map_err(|v| SpecViolation::at(index, v.0))?;
        }
        Ok(())
    }
}

impl OperationSpec {
    fn check(&self) -> Result<(), SpecViolation> {
        if let Some(trim) = &self.trim {
            trim.bounds()?;
        }
        match &self.frame {
            FrameTransform::Keep => {}
            FrameTransform::Crop(region) => region.check().map_err(SpecViolation)?,
            FrameTransform::Vertical(params) => {
                params
                    .validate()
                    .map_err(|_| SpecViolation(format!(
                        "scale_factor {} out of range 1.0-2.0",
                        params.scale_factor
                    )))?;
            }
        }
        if let Some(encoding) = &self.encoding {
            encoding.check().map_err(SpecViolation)?;
        }
        if self.copy_streams {
            if !matches!(self.frame, FrameTransform::Keep) {
                return Err(SpecViolation(
                    "copy_streams cannot be combined with a frame transform".to_string(),
                ));
            }
            if self.encoding.is_some() {
                return Err(SpecViolation(
                    "copy_streams cannot be combined with an encoding override".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Effective encoding for this operation given the job-level default.
    pub fn effective_encoding<'a>(&'a self, job_default: &'a EncodingConfig) -> &'a EncodingConfig {
        self.encoding.as_ref().unwrap_or(job_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trim(start: &str, end: &str) -> OperationSpec {
        OperationSpec {
            trim: Some(Trim {
                start: start.to_string(),
                end: end.to_string(),
            }),
            frame: FrameTransform::Keep,
            encoding: None,
            copy_streams: false,
        }
    }

    #[test]
    fn test_valid_spec() {
        let spec = JobSpec {
            operations: vec![
                trim("00:00:10", "00:00:40"),
                OperationSpec {
                    trim: None,
                    frame: FrameTransform::Vertical(VerticalParams::default()),
                    encoding: None,
                    copy_streams: false,
                },
            ],
            encoding: EncodingConfig::default(),
        };
        assert!(spec.validate(MAX_OPERATIONS_PER_JOB).is_ok());
    }

    #[test]
    fn test_empty_spec_rejected() {
        let spec = JobSpec {
            operations: vec![],
            encoding: EncodingConfig::default(),
        };
        assert!(spec.validate(MAX_OPERATIONS_PER_JOB).is_err());
    }

    #[test]
    fn test_operation_count_bound() {
        let spec = JobSpec {
            operations: (0..5).map(|_| trim("0", "10")).collect(),
            encoding: EncodingConfig::default(),
        };
        assert!(spec.validate(4).is_err());
        assert!(spec.validate(5).is_ok());
    }

    #[test]
    fn test_inverted_trim_rejected() {
        let spec = JobSpec {
            operations: vec![trim("00:01:00", "00:00:30")],
            encoding: EncodingConfig::default(),
        };
        let err = spec.validate(MAX_OPERATIONS_PER_JOB).unwrap_err();
        assert!(err.0.contains("operation 0"));
    }

    #[test]
    fn test_zero_sized_crop_rejected() {
        let spec = JobSpec {
            operations: vec![OperationSpec {
                trim: None,
                frame: FrameTransform::Crop(CropRegion {
                    width: 0,
                    height: 1080,
                    x: 0,
                    y: 0,
                }),
                encoding: None,
                copy_streams: false,
            }],
            encoding: EncodingConfig::default(),
        };
        assert!(spec.validate(MAX_OPERATIONS_PER_JOB).is_err());
    }

    #[test]
    fn test_scale_factor_range() {
        let spec = JobSpec {
            operations: vec![OperationSpec {
                trim: None,
                frame: FrameTransform::Vertical(VerticalParams { scale_factor: 3.0 }),
                encoding: None,
                copy_streams: false,
            }],
            encoding: EncodingConfig::default(),
        };
        assert!(spec.validate(MAX_OPERATIONS_PER_JOB).is_err());
    }

    #[test]
    fn test_copy_streams_excludes_transforms() {
        let mut op = trim("0", "10");
        op.copy_streams = true;
        let spec = JobSpec {
            operations: vec![op.clone()],
            encoding: EncodingConfig::default(),
        };
        assert!(spec.validate(MAX_OPERATIONS_PER_JOB).is_ok());

        op.frame = FrameTransform::Vertical(VerticalParams::default());
        let spec = JobSpec {
            operations: vec![op],
            encoding: EncodingConfig::default(),
        };
        assert!(spec.validate(MAX_OPERATIONS_PER_JOB).is_err());
    }

    #[test]
    fn test_frame_transform_wire_format() {
        let json = r#"{"kind":"crop","width":1080,"height":1920,"x":420,"y":0}"#;
        let frame: FrameTransform = serde_json::from_str(json).unwrap();
        assert!(matches!(frame, FrameTransform::Crop(_)));

        let json = r#"{"kind":"vertical","scale_factor":1.5}"#;
        let frame: FrameTransform = serde_json::from_str(json).unwrap();
        assert!(matches!(frame, FrameTransform::Vertical(_)));
    }
}
