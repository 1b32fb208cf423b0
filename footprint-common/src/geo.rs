//! Web-Mercator geometry
//!
//! Pure, stateless conversions between crop-local pixel coordinates and
//! WGS84 latitude/longitude, plus rotation about the crop center and
//! spherical polygon area.
//!
//! Global pixel space follows the slippy-map convention: tile size 256 px,
//! world size `256 · 2^zoom`, origin at (lat 85.05°, lng -180°), y growing
//! southwards. Fractional zoom levels are honored exactly.
//!
//! None of these functions fail. NaN inputs propagate to NaN outputs, so
//! callers validate coordinates upstream.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Raster tile edge in pixels
pub const TILE_SIZE: f64 = 256.0;

/// WGS84 equatorial radius in meters (used for ring area)
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Geodetic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite numbers
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// World edge length in global pixels at `zoom`
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2f64.powf(zoom)
}

/// Project a coordinate to global pixel space at `zoom`
pub fn lat_lng_to_global_px(point: LatLng, zoom: f64) -> (f64, f64) {
    let world = world_size(zoom);
    let x = (point.lng + 180.0) / 360.0 * world;
    let sin_lat = point.lat.to_radians().sin();
    let y = (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI)) * world;
    (x, y)
}

/// Inverse Mercator: global pixel space at `zoom` back to a coordinate
///
/// Latitude uses `atan(sinh(n))`, which stays exact at high zoom where a
/// linear approximation accumulates error.
pub fn global_px_to_lat_lng(x: f64, y: f64, zoom: f64) -> LatLng {
    let world = world_size(zoom);
    let lng = x / world * 360.0 - 180.0;
    let n = PI - 2.0 * PI * y / world;
    let lat = n.sinh().atan().to_degrees();
    LatLng { lat, lng }
}

/// Convert a crop-local pixel to a coordinate
///
/// `(crop_size_px / 2, crop_size_px / 2)` is the capture center. The local
/// offset from that pixel is added to the center's global pixel position
/// and the sum is inverted back to latitude/longitude.
pub fn pixel_to_geo(px: f64, py: f64, center: LatLng, zoom: f64, crop_size_px: u32) -> LatLng {
    let (cx, cy) = lat_lng_to_global_px(center, zoom);
    let half = f64::from(crop_size_px) / 2.0;
    global_px_to_lat_lng(cx + (px - half), cy + (py - half), zoom)
}

/// Convert a coordinate to a crop-local pixel (inverse of [`pixel_to_geo`])
pub fn geo_to_pixel(point: LatLng, center: LatLng, zoom: f64, crop_size_px: u32) -> (f64, f64) {
    let (cx, cy) = lat_lng_to_global_px(center, zoom);
    let (x, y) = lat_lng_to_global_px(point, zoom);
    let half = f64::from(crop_size_px) / 2.0;
    (x - cx + half, y - cy + half)
}

/// Rotate a crop-local pixel about the crop center by `angle_deg`
///
/// Positive angles turn counterclockwise as seen on screen (y down), the
/// way a map turns under a positive compass bearing. To bring a capture
/// taken at `bearing_deg` back to north-up, rotate by `-bearing_deg`.
pub fn rotate_pixel(px: f64, py: f64, angle_deg: f64, crop_size_px: u32) -> (f64, f64) {
    let c = f64::from(crop_size_px) / 2.0;
    let (dx, dy) = (px - c, py - c);
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    (c + dx * cos + dy * sin, c - dx * sin + dy * cos)
}

/// Area of a lat/lng ring in square meters
///
/// Spherical approximation on the WGS84 equatorial radius
/// (`R²/2 · Σ (λ[i+1] − λ[i−1]) · sin φ[i]`). The ring is closed
/// implicitly; an explicit closing vertex is accepted. Rings with fewer
/// than three vertices have zero area.
pub fn ring_area_sq_meters(points: &[LatLng]) -> f64 {
    let mut ring = points;
    if ring.len() >= 2 && ring.first() == ring.last() {
        ring = &ring[..ring.len() - 1];
    }
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let lower = ring[i];
        let middle = ring[(i + 1) % n];
        let upper = ring[(i + 2) % n];
        total += (upper.lng.to_radians() - lower.lng.to_radians()) * middle.lat.to_radians().sin();
    }

    (total * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs()
}
