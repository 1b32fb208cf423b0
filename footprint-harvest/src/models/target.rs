//! Point locations to process

use footprint_common::LatLng;
use serde::{Deserialize, Serialize};

/// One subject to process (a site whose footprint is extracted)
///
/// Targets are immutable input: a run borrows the list and only produces
/// derived results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
}

impl Target {
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lng,
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}
