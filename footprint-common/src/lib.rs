//! # Footprint Common Library
//!
//! Shared code for the footprint harvesting tools:
//! - Error type and result alias
//! - TOML configuration model and file resolution
//! - Batch event types (BatchEvent) and the EventBus
//! - Web-Mercator geometry (pixel ↔ geodetic, rotation, ring area)

pub mod config;
pub mod error;
pub mod events;
pub mod geo;

pub use error::{Error, Result};
pub use geo::LatLng;
