//! Pixel polygons to geodetic polygons
//!
//! Projection uses the view state recorded in the capture, never the live
//! surface. A rotated capture is first turned back to north-up about the
//! crop center.

use crate::models::{CaptureResult, GeoPolygon, PixelPolygon};
use footprint_common::geo::{pixel_to_geo, ring_area_sq_meters, rotate_pixel};

/// Convert every polygon found in `capture`
///
/// Never fails; non-finite points produce non-finite coordinates and area.
pub fn convert_polygons(polygons: &[PixelPolygon], capture: &CaptureResult) -> Vec<GeoPolygon> {
    polygons.iter().map(|p| convert_polygon(p, capture)).collect()
}

pub fn convert_polygon(polygon: &PixelPolygon, capture: &CaptureResult) -> GeoPolygon {
    let crop = capture.crop_size_px;
    let points: Vec<_> = polygon
        .points
        .iter()
        .map(|&(px, py)| {
            let (x, y) = if capture.bearing_deg != 0.0 {
                rotate_pixel(px, py, -capture.bearing_deg, crop)
            } else {
                (px, py)
            };
            pixel_to_geo(x, y, capture.center, capture.zoom, crop)
        })
        .collect();

    let area_sq_meters = if points.len() < 3 {
        0.0
    } else {
        ring_area_sq_meters(&points)
    };

    GeoPolygon {
        points,
        label: polygon.label.clone(),
        color: polygon.color.clone(),
        kind: polygon.kind.clone(),
        area_sq_meters,
    }
}
