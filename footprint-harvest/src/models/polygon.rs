//! Polygon results in pixel and geodetic space

use footprint_common::LatLng;
use serde::{Deserialize, Serialize};

/// Polygon in crop-local pixel coordinates, as returned by segmentation
///
/// Wire form: `{ "label", "points": [[x, y], ...], "color"?, "tipo"? }`.
/// Unknown fields (area estimates, free-form properties) are ignored; area is
/// always recomputed from the projected ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelPolygon {
    #[serde(default)]
    pub points: Vec<(f64, f64)>,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, alias = "tipo", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Polygon in geodetic coordinates with its recomputed area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    pub points: Vec<LatLng>,
    pub label: String,
    pub color: Option<String>,
    pub kind: Option<String>,
    pub area_sq_meters: f64,
}

/// One exported row (one per polygon)
///
/// Field order is the export column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub target_id: String,
    pub polygon_label: String,
    pub area_sq_meters: f64,
    pub final_lat: f64,
    pub final_lng: f64,
}

impl OutputRow {
    pub fn new(target_id: &str, polygon: &GeoPolygon, final_position: LatLng) -> Self {
        Self {
            target_id: target_id.to_string(),
            polygon_label: polygon.label.clone(),
            area_sq_meters: polygon.area_sq_meters,
            final_lat: final_position.lat,
            final_lng: final_position.lng,
        }
    }
}
