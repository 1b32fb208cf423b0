//! View commands and capture artifacts

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use footprint_common::config::{HarvestSettings, ImageFormat};
use footprint_common::LatLng;
use serde::{Deserialize, Serialize};

/// Instruction to move the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewCommand {
    pub center: LatLng,
    pub zoom: f64,
    pub animate: bool,
}

impl ViewCommand {
    /// Jump (no animation) to `center` at `zoom`
    pub fn jump(center: LatLng, zoom: f64) -> Self {
        Self {
            center,
            zoom,
            animate: false,
        }
    }
}

/// What the surface currently shows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub center: LatLng,
    pub zoom: f64,
    pub bearing_deg: f64,
}

/// Parameters of one capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Output square edge, logical pixels
    pub crop_size_px: u32,
    /// Surface pixel-density scale
    pub render_scale: f64,
    pub image_format: ImageFormat,
    /// Encoder quality in [0, 1]
    pub quality: f64,
}

impl CaptureRequest {
    pub fn from_settings(settings: &HarvestSettings) -> Self {
        Self {
            crop_size_px: settings.crop_size_px,
            render_scale: settings.render_scale,
            image_format: settings.image_format,
            quality: settings.quality,
        }
    }

    /// Reject a zero crop, a non-positive scale and out-of-range quality
    pub fn validate(&self) -> Result<(), String> {
        if self.crop_size_px == 0 {
            return Err("crop size must be positive".to_string());
        }
        if !(self.render_scale.is_finite() && self.render_scale > 0.0) {
            return Err(format!("render scale must be positive, got {}", self.render_scale));
        }
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(format!("quality must be within [0, 1], got {}", self.quality));
        }
        Ok(())
    }
}

/// Encoded bitmap ready for an oracle
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` form accepted by the oracles
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.to_base64())
    }
}

/// Accepted capture plus the view state at the instant it was taken
///
/// `center`, `zoom` and `bearing_deg` are the only inputs used to project
/// polygons found in this image.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub image: EncodedImage,
    pub crop_size_px: u32,
    pub zoom: f64,
    pub bearing_deg: f64,
    pub center: LatLng,
    pub mean_luminance: f64,
}
