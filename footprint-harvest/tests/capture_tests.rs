//! Frame acquisition tests
//!
//! Settle/capture/retry behavior against a scripted surface.

mod helpers;

use footprint_common::config::HarvestSettings;
use footprint_harvest::capture::{capture, settle, FrameAcquirer, SettleBudget, SettleOutcome};
use footprint_harvest::error::CaptureError;
use footprint_harvest::models::{CaptureRequest, ImageFormat};
use footprint_harvest::surface::TileReadiness;
use helpers::fake_surface::{BLACK, GRAY};
use helpers::{fast_policy, FakeSurface};
use std::time::Duration;

fn request() -> CaptureRequest {
    CaptureRequest::from_settings(&HarvestSettings::default())
}

#[tokio::test]
async fn accepted_capture_records_view_state() {
    // Given: a settled gray surface turned by 12°
    let mut surface = FakeSurface::gray().with_bearing(12.0);
    surface.view.zoom = 18.8;
    let acquirer = FrameAcquirer::new(fast_policy());

    // When: acquiring one frame
    let result = acquirer.acquire(&mut surface, &request()).await.unwrap();

    // Then: one snapshot, JPEG bytes, and the view state at capture time
    assert_eq!(surface.snapshots, 1);
    assert_eq!(result.image.format, ImageFormat::Jpeg);
    assert_eq!(&result.image.bytes[..2], &[0xFF, 0xD8]);
    assert_eq!(result.crop_size_px, 500);
    assert_eq!(result.zoom, 18.8);
    assert_eq!(result.bearing_deg, 12.0);
    assert!((result.mean_luminance - 128.0).abs() < 1.0);
}

#[tokio::test]
async fn chrome_hidden_during_snapshot_and_restored() {
    let mut surface = FakeSurface::gray();
    let acquirer = FrameAcquirer::new(fast_policy());

    acquirer.acquire(&mut surface, &request()).await.unwrap();

    assert_eq!(surface.chrome_during_snapshots, vec![false]);
    assert!(surface.chrome_visible);
}

#[tokio::test]
async fn chrome_restored_when_snapshot_fails() {
    let mut surface = FakeSurface::gray();
    surface.fail_snapshots = true;
    let acquirer = FrameAcquirer::new(fast_policy());

    let result = acquirer.acquire(&mut surface, &request()).await;

    assert!(matches!(result, Err(CaptureError::Surface(_))));
    assert!(surface.chrome_visible);
    // Surface failures are not retried
    assert_eq!(surface.snapshots, 1);
}

#[tokio::test]
async fn single_black_capture_is_degenerate() {
    let mut surface = FakeSurface::black();

    let result = capture(&mut surface, &request(), 6.0).await;

    match result {
        Err(CaptureError::Degenerate { luminance, threshold }) => {
            assert_eq!(luminance, 0.0);
            assert_eq!(threshold, 6.0);
        }
        other => panic!("expected degenerate capture, got {:?}", other),
    }
}

#[tokio::test]
async fn black_frames_exhaust_retries() {
    // Given: a surface that only ever renders black
    let mut surface = FakeSurface::black();
    let acquirer = FrameAcquirer::new(fast_policy());

    // When: acquiring
    let result = acquirer.acquire(&mut surface, &request()).await;

    // Then: exactly max_attempts snapshots, then a fatal error
    assert!(matches!(
        result,
        Err(CaptureError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(surface.snapshots, 3);
    assert!(surface.chrome_visible);
}

#[tokio::test]
async fn retry_recovers_after_black_frame() {
    let mut surface = FakeSurface::gray().with_frames(&[BLACK, BLACK, GRAY]);
    let acquirer = FrameAcquirer::new(fast_policy());

    let result = acquirer.acquire(&mut surface, &request()).await.unwrap();

    assert_eq!(surface.snapshots, 3);
    assert!(result.mean_luminance > 6.0);
}

#[tokio::test]
async fn high_density_snapshot_is_resampled() {
    let mut surface = FakeSurface::gray();
    let request = CaptureRequest {
        render_scale: 2.0,
        image_format: ImageFormat::Png,
        ..request()
    };

    let result = capture(&mut surface, &request, 6.0).await.unwrap();

    let decoded = image::load_from_memory(&result.image.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (500, 500));
}

#[tokio::test]
async fn crop_larger_than_surface_fails() {
    let mut surface = FakeSurface::gray();
    surface.logical_height = 400;

    let result = capture(&mut surface, &request(), 6.0).await;

    assert!(matches!(result, Err(CaptureError::CropOutOfBounds { .. })));
}

#[tokio::test]
async fn invalid_request_is_rejected_before_snapshot() {
    let mut surface = FakeSurface::gray();
    let bad = CaptureRequest {
        quality: 2.0,
        ..request()
    };

    let result = capture(&mut surface, &bad, 6.0).await;

    assert!(matches!(result, Err(CaptureError::InvalidRequest(_))));
    assert_eq!(surface.snapshots, 0);
}

#[tokio::test]
async fn settle_is_best_effort_when_tiles_never_load() {
    let mut surface = FakeSurface::gray();
    surface.readiness = TileReadiness { ready: 1, visible: 12 };
    let budget = SettleBudget {
        min_ready_tiles: 6,
        max_wait: Duration::from_millis(40),
    };

    let started = std::time::Instant::now();
    let outcome = settle(&mut surface, budget).await;

    assert_eq!(outcome, SettleOutcome::BestEffort);
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn settle_needs_only_the_visible_tiles() {
    // Fewer visible tiles than the minimum: all of them is enough
    let mut surface = FakeSurface::gray();
    surface.readiness = TileReadiness { ready: 4, visible: 4 };
    let budget = SettleBudget {
        min_ready_tiles: 6,
        max_wait: Duration::from_secs(5),
    };

    assert_eq!(settle(&mut surface, budget).await, SettleOutcome::Ready);
}
