//! Data models for footprint-harvest
//!
//! - Targets and view commands (inputs)
//! - Capture requests/results (frame acquisition)
//! - Pixel and geodetic polygons, output rows (results)
//! - Batch run state machine and per-target outcomes

pub mod batch_run;
pub mod capture;
pub mod outcome;
pub mod polygon;
pub mod target;

pub use batch_run::{BatchRun, RunProgress, RunState, StateTransition};
pub use capture::{CaptureRequest, CaptureResult, EncodedImage, ViewCommand, ViewState};
pub use footprint_common::config::ImageFormat;
pub use outcome::{BatchReport, HarmonizationOutcome, PipelineStage, TargetOutcome, TargetStatus};
pub use polygon::{GeoPolygon, OutputRow, PixelPolygon};
pub use target::Target;
