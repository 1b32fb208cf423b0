//! Error types for footprint-harvest
//!
//! One enum per failure domain. `HarvestError` is the per-target pipeline
//! error the orchestrator isolates; none of these abort a batch.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Rendering surface failures
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// A tile could not be fetched or decoded
    #[error("Tile {z}/{x}/{y} failed: {reason}")]
    Tile { z: u8, x: u32, y: u32, reason: String },

    /// The surface cannot render right now
    #[error("Surface unavailable: {0}")]
    Unavailable(String),

    /// Non-finite center or out-of-range zoom
    #[error("Invalid view: {0}")]
    InvalidView(String),
}

/// Frame acquisition failures
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Near-black frame; the only retried kind
    #[error("Degenerate capture: mean luminance {luminance:.2} below {threshold:.2}")]
    Degenerate { luminance: f64, threshold: f64 },

    #[error("Capture failed after {attempts} attempts (last mean luminance {last_luminance:.2})")]
    RetriesExhausted { attempts: u32, last_luminance: f64 },

    #[error("Crop of {crop_px} px does not fit a {width}x{height} snapshot")]
    CropOutOfBounds { crop_px: u32, width: u32, height: u32 },

    #[error("Invalid capture request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error("Image encoding failed: {0}")]
    Encode(String),
}

/// Remote oracle failures
#[derive(Debug, Error)]
pub enum OracleError {
    /// Connection or I/O failure
    #[error("Oracle transport error: {0}")]
    Transport(String),

    /// Watchdog fired before a response arrived
    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// Non-2xx status or malformed body
    #[error("Oracle protocol error{}: {detail}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Protocol { status: Option<u16>, detail: String },
}

impl OracleError {
    /// Network-level failure (transport or timeout)
    pub fn is_transport(&self) -> bool {
        matches!(self, OracleError::Transport(_) | OracleError::Timeout(_))
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        OracleError::Protocol {
            status: None,
            detail: detail.into(),
        }
    }
}

/// Error fatal to one target's pipeline
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

impl HarvestError {
    /// The oracle could not be reached or did not answer in time
    pub fn is_transport(&self) -> bool {
        matches!(self, HarvestError::Oracle(e) if e.is_transport())
    }
}

/// Export failures
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Export I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Target list loading failures
#[derive(Debug, Error)]
pub enum TargetLoadError {
    #[error("Cannot read target list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed target list: {0}")]
    Csv(#[from] csv::Error),

    #[error("Target list has no usable columns (need id plus lat/lng or wkt_geom); found: {0}")]
    NoUsableColumns(String),
}
