//! footprint-harvest library interface
//!
//! Pipeline pieces, leaf first:
//! - [`projector`]: pixel polygons to geodetic polygons with areas
//! - [`capture`]: settle, snapshot, crop, reject, encode
//! - [`harmonize`]: oracle-driven coordinate convergence
//! - [`orchestrator`]: sequential batch runs with per-target isolation
//! - [`sink`]: CSV export
//!
//! Adapters and plumbing: [`surface`] (rendering capability and the tile
//! mosaic), [`oracle`] (HTTP clients), [`reporter`], [`targets`],
//! [`config`].

pub mod capture;
pub mod config;
pub mod error;
pub mod harmonize;
pub mod models;
pub mod oracle;
pub mod orchestrator;
pub mod projector;
pub mod reporter;
pub mod sink;
pub mod surface;
pub mod targets;

pub use crate::error::{CaptureError, HarvestError, OracleError, SinkError, SurfaceError, TargetLoadError};
pub use crate::orchestrator::{BatchConfig, BatchOrchestrator};
