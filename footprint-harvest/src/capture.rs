//! Frame acquisition
//!
//! Turns a moving, asynchronously loading surface into one stable square
//! bitmap: wait for tiles to settle, snapshot with chrome hidden, crop the
//! center, reject near-black frames, encode.
//!
//! Phase progression per attempt:
//! Idle → AwaitingSettle → Capturing → Accepted | Rejected (retry)

use crate::error::CaptureError;
use crate::models::{CaptureRequest, CaptureResult, EncodedImage, ImageFormat};
use crate::surface::{CleanCapture, RenderingSurface, SurfaceFrame};
use footprint_common::config::CaptureSettings;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Readiness poll interval (one display frame)
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Inset of the luminance sample points from the crop edge
pub const SAMPLE_INSET_PX: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquirePhase {
    Idle,
    AwaitingSettle,
    Capturing,
    Accepted,
    Rejected,
}

/// Bound on one readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleBudget {
    pub min_ready_tiles: usize,
    pub max_wait: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Enough visible tiles loaded
    Ready,
    /// Budget elapsed first; proceed anyway
    BestEffort,
}

/// Retry policy and rejection threshold
#[derive(Debug, Clone, PartialEq)]
pub struct AcquirePolicy {
    pub initial_settle: SettleBudget,
    pub retry_settle: SettleBudget,
    pub max_attempts: u32,
    /// Mean sampled luminance (0-255) below which a frame is rejected
    pub black_luminance_threshold: f64,
}

impl AcquirePolicy {
    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self {
            initial_settle: SettleBudget {
                min_ready_tiles: settings.min_ready_tiles,
                max_wait: Duration::from_millis(settings.settle_max_wait_ms),
            },
            retry_settle: SettleBudget {
                min_ready_tiles: settings.min_ready_tiles,
                max_wait: Duration::from_millis(settings.retry_settle_wait_ms),
            },
            max_attempts: settings.max_attempts.max(1),
            black_luminance_threshold: settings.black_luminance_threshold,
        }
    }
}

impl Default for AcquirePolicy {
    fn default() -> Self {
        Self::from_settings(&CaptureSettings::default())
    }
}

/// Wait until enough visible tiles are loaded or the budget runs out
///
/// Never fails: a surface that never settles is captured best-effort.
pub async fn settle(surface: &mut dyn RenderingSurface, budget: SettleBudget) -> SettleOutcome {
    let deadline = Instant::now() + budget.max_wait;
    loop {
        let readiness = surface.tile_readiness().await;
        let needed = budget.min_ready_tiles.min(readiness.visible);
        if readiness.ready >= needed {
            return SettleOutcome::Ready;
        }
        if Instant::now() >= deadline {
            debug!(
                ready = readiness.ready,
                visible = readiness.visible,
                "Settle budget elapsed"
            );
            return SettleOutcome::BestEffort;
        }
        tokio::time::sleep(FRAME_INTERVAL).await;
    }
}

/// One capture attempt inside a clean-capture scope
pub async fn capture(
    surface: &mut dyn RenderingSurface,
    request: &CaptureRequest,
    black_luminance_threshold: f64,
) -> Result<CaptureResult, CaptureError> {
    request.validate().map_err(CaptureError::InvalidRequest)?;

    let (frame, view) = {
        let mut scope = CleanCapture::begin(surface);
        let view = scope.view();
        let frame = scope.snapshot(request.render_scale).await?;
        (frame, view)
    };

    let crop = crop_center(&frame, request.crop_size_px)?;
    let luminance = mean_sample_luminance(&crop);
    if luminance < black_luminance_threshold {
        return Err(CaptureError::Degenerate {
            luminance,
            threshold: black_luminance_threshold,
        });
    }

    let format = request.image_format;
    let quality = request.quality;
    let bytes = tokio::task::spawn_blocking(move || encode(crop, format, quality))
        .await
        .map_err(|e| CaptureError::Encode(format!("encoder task failed: {}", e)))??;

    Ok(CaptureResult {
        image: EncodedImage { format, bytes },
        crop_size_px: request.crop_size_px,
        zoom: view.zoom,
        bearing_deg: view.bearing_deg,
        center: view.center,
        mean_luminance: luminance,
    })
}

/// Settle-and-capture with bounded retry of degenerate frames
pub struct FrameAcquirer {
    policy: AcquirePolicy,
}

impl FrameAcquirer {
    pub fn new(policy: AcquirePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AcquirePolicy {
        &self.policy
    }

    /// Only `Degenerate` is retried; anything else fails immediately
    pub async fn acquire(
        &self,
        surface: &mut dyn RenderingSurface,
        request: &CaptureRequest,
    ) -> Result<CaptureResult, CaptureError> {
        let mut last_luminance = 0.0;
        let mut phase = AcquirePhase::Idle;

        for attempt in 1..=self.policy.max_attempts {
            let budget = if attempt == 1 {
                self.policy.initial_settle
            } else {
                self.policy.retry_settle
            };

            phase = advance(phase, AcquirePhase::AwaitingSettle, attempt);
            let outcome = settle(surface, budget).await;

            phase = advance(phase, AcquirePhase::Capturing, attempt);
            match capture(surface, request, self.policy.black_luminance_threshold).await {
                Ok(result) => {
                    advance(phase, AcquirePhase::Accepted, attempt);
                    debug!(
                        attempt,
                        settle = ?outcome,
                        luminance = result.mean_luminance,
                        bytes = result.image.bytes.len(),
                        "Capture accepted"
                    );
                    return Ok(result);
                }
                Err(CaptureError::Degenerate { luminance, threshold }) => {
                    phase = advance(phase, AcquirePhase::Rejected, attempt);
                    last_luminance = luminance;
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        luminance,
                        threshold,
                        "Degenerate capture rejected"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(CaptureError::RetriesExhausted {
            attempts: self.policy.max_attempts,
            last_luminance,
        })
    }
}

impl Default for FrameAcquirer {
    fn default() -> Self {
        Self::new(AcquirePolicy::default())
    }
}

fn advance(from: AcquirePhase, to: AcquirePhase, attempt: u32) -> AcquirePhase {
    debug!(attempt, from = ?from, to = ?to, "Acquire phase");
    to
}

/// Central `crop · k` square resampled to `crop × crop`
///
/// `k` is the snapshot's pixel density (bitmap width / logical width).
pub fn crop_center(frame: &SurfaceFrame, crop_size_px: u32) -> Result<RgbaImage, CaptureError> {
    let (width, height) = frame.image.dimensions();
    let out_of_bounds = || CaptureError::CropOutOfBounds {
        crop_px: crop_size_px,
        width: frame.logical_width,
        height: frame.logical_height,
    };

    if frame.logical_width == 0 || crop_size_px > frame.logical_width || crop_size_px > frame.logical_height {
        return Err(out_of_bounds());
    }

    let k = f64::from(width) / f64::from(frame.logical_width);
    let side = (f64::from(crop_size_px) * k).round() as u32;
    if side == 0 || side > width || side > height {
        return Err(out_of_bounds());
    }

    let x = (width - side) / 2;
    let y = (height - side) / 2;
    let region = image::imageops::crop_imm(&frame.image, x, y, side, side).to_image();

    if side == crop_size_px {
        Ok(region)
    } else {
        Ok(image::imageops::resize(&region, crop_size_px, crop_size_px, FilterType::Triangle))
    }
}

/// Nine sample points: center, corners and edge midpoints, inset from the edge
pub fn sample_points(width: u32, height: u32) -> [(u32, u32); 9] {
    let inset_x = SAMPLE_INSET_PX.min(width.saturating_sub(1) / 2);
    let inset_y = SAMPLE_INSET_PX.min(height.saturating_sub(1) / 2);
    let (x0, x1, x2) = (inset_x, width / 2, width.saturating_sub(1 + inset_x));
    let (y0, y1, y2) = (inset_y, height / 2, height.saturating_sub(1 + inset_y));
    [
        (x1, y1),
        (x0, y0),
        (x2, y0),
        (x0, y2),
        (x2, y2),
        (x1, y0),
        (x1, y2),
        (x0, y1),
        (x2, y1),
    ]
}

/// Rec. 709 luma on the 0-255 scale
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.2126 * f64::from(r) + 0.7152 * f64::from(g) + 0.0722 * f64::from(b)
}

pub fn mean_sample_luminance(image: &RgbaImage) -> f64 {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let points = sample_points(width, height);
    let total: f64 = points
        .iter()
        .map(|&(x, y)| {
            let p = image.get_pixel(x, y);
            luminance(p[0], p[1], p[2])
        })
        .sum();
    total / points.len() as f64
}

fn encode(image: RgbaImage, format: ImageFormat, quality: f64) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
            let q = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            JpegEncoder::new_with_quality(&mut bytes, q)
                .encode_image(&rgb)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }
        ImageFormat::Png => {
            DynamicImage::ImageRgba8(image)
                .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame(logical: (u32, u32), scale: u32, color: [u8; 4]) -> SurfaceFrame {
        SurfaceFrame {
            image: RgbaImage::from_pixel(logical.0 * scale, logical.1 * scale, Rgba(color)),
            logical_width: logical.0,
            logical_height: logical.1,
        }
    }

    #[test]
    fn luminance_weights() {
        assert_eq!(luminance(0, 0, 0), 0.0);
        assert!((luminance(255, 255, 255) - 255.0).abs() < 1e-9);
        assert!(luminance(0, 255, 0) > luminance(255, 0, 0));
    }

    #[test]
    fn sample_points_are_inset() {
        let points = sample_points(500, 500);
        assert_eq!(points[0], (250, 250));
        assert!(points.contains(&(8, 8)));
        assert!(points.contains(&(491, 491)));
        assert!(points.contains(&(250, 8)));
    }

    #[test]
    fn crop_resamples_high_density_snapshots() {
        let f = frame((800, 600), 2, [90, 90, 90, 255]);
        let crop = crop_center(&f, 500).unwrap();
        assert_eq!(crop.dimensions(), (500, 500));
        assert_eq!(*crop.get_pixel(250, 250), Rgba([90, 90, 90, 255]));
    }

    #[test]
    fn crop_takes_center_region() {
        let mut image = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        for y in 40..60 {
            for x in 40..60 {
                image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let f = SurfaceFrame {
            image,
            logical_width: 100,
            logical_height: 100,
        };
        let crop = crop_center(&f, 20).unwrap();
        assert!(crop.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn crop_larger_than_surface_is_rejected() {
        let f = frame((400, 300), 1, [90, 90, 90, 255]);
        assert!(matches!(
            crop_center(&f, 500),
            Err(CaptureError::CropOutOfBounds { crop_px: 500, .. })
        ));
    }

    #[test]
    fn black_crop_has_zero_luminance() {
        let image = RgbaImage::from_pixel(50, 50, Rgba([0, 0, 0, 255]));
        assert_eq!(mean_sample_luminance(&image), 0.0);
    }

    #[test]
    fn encodes_jpeg_and_png() {
        let image = RgbaImage::from_pixel(16, 16, Rgba([10, 200, 30, 255]));

        let jpeg = encode(image.clone(), ImageFormat::Jpeg, 0.9).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let png = encode(image, ImageFormat::Png, 0.9).unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn policy_from_defaults() {
        let policy = AcquirePolicy::default();
        assert_eq!(policy.initial_settle.min_ready_tiles, 6);
        assert_eq!(policy.initial_settle.max_wait, Duration::from_millis(900));
        assert_eq!(policy.retry_settle.max_wait, Duration::from_millis(300));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.black_luminance_threshold, 6.0);
    }
}
