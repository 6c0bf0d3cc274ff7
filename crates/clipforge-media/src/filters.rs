//! FFmpeg video filter construction.

use clipforge_models::{CropRegion, FrameTransform};

/// Portrait canvas width.
pub const VERTICAL_WIDTH: i64 = 1080;
/// Portrait canvas height.
pub const VERTICAL_HEIGHT: i64 = 1920;

/// A built filter, distinguishing `-vf` chains from `-filter_complex` graphs.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    /// Single-chain filter for `-vf`
    Simple(String),
    /// Multi-chain graph for `-filter_complex`
    Complex(String),
}

/// Build the filter for a frame transform, given the probed source
/// dimensions. Returns `None` when the frame passes through untouched.
pub fn frame_filter(
    transform: &FrameTransform,
    src_width: u32,
    src_height: u32,
) -> Option<FilterSpec> {
    match transform {
        FrameTransform::Keep => None,
        FrameTransform::Crop(region) => Some(FilterSpec::Simple(crop_filter(region))),
        FrameTransform::Vertical(params) => Some(FilterSpec::Complex(vertical_filter(
            src_width,
            src_height,
            params.scale_factor,
        ))),
    }
}

/// Pixel-region crop filter.
pub fn crop_filter(region: &CropRegion) -> String {
    format!(
        "crop={}:{}:{}:{}",
        region.width, region.height, region.x, region.y
    )
}

/// Vertical 9:16 conversion: the source centered over a blurred, zoomed copy
/// of itself filling a 1080x1920 canvas.
///
/// Geometry: the foreground is scaled to `scale_factor` times the canvas
/// width; the background is scaled to fill the canvas height, blurred, and
/// center-cropped to the canvas.
pub fn vertical_filter(src_width: u32, src_height: u32, scale_factor: f64) -> String {
    let src_width = src_width.max(1) as i64;
    let src_height = src_height.max(1) as i64;

    // Foreground: enlarged past the canvas width for readability
    let main_w = (VERTICAL_WIDTH as f64 * scale_factor) as i64;
    let main_h = src_height * main_w / src_width;
    let main_x = (VERTICAL_WIDTH - main_w) / 2;
    let main_y = (VERTICAL_HEIGHT - main_h) / 2;

    // Background: fill the canvas height, center horizontally
    let bg_h = VERTICAL_HEIGHT;
    let bg_w = src_width * bg_h / src_height;
    let bg_x = (VERTICAL_WIDTH - bg_w) / 2;
    let bg_crop_x = if bg_x < 0 { -bg_x } else { 0 };

    format!(
        "[0:v]scale={bg_w}:{bg_h},boxblur=15:3,crop={VERTICAL_WIDTH}:{VERTICAL_HEIGHT}:{bg_crop_x}:0[bg];\
         [0:v]scale={main_w}:{main_h}[main];\
         [bg][main]overlay={main_x}:{main_y}"
    )
}
