//! Headless XYZ tile-mosaic surface
//!
//! Fetches raster tiles over HTTP and composites the viewport in memory.
//! Tiles are requested at `round(zoom)` clamped to the source's native
//! maximum and resampled to the fractional view zoom at snapshot time.
//!
//! The tile set covers the disc circumscribing the viewport, so the same
//! tiles serve every bearing.

use super::{validate_view, RenderingSurface, SurfaceFrame, TileReadiness};
use crate::error::SurfaceError;
use crate::models::{ViewCommand, ViewState};
use async_trait::async_trait;
use footprint_common::config::SurfaceSettings;
use footprint_common::geo::{lat_lng_to_global_px, TILE_SIZE};
use footprint_common::LatLng;
use image::{Rgba, RgbaImage};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("footprint-harvest/", env!("CARGO_PKG_VERSION"));

/// Largest snapshot edge accepted, physical pixels
const MAX_SNAPSHOT_EDGE: f64 = 16_384.0;

const CROSSHAIR_HALF_LEN: f64 = 10.0;
const CROSSHAIR_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const EMPTY_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Clone, PartialEq)]
pub struct TileMosaicConfig {
    /// Template with `{z}`, `{x}` and `{y}` placeholders
    pub tile_url: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub max_native_zoom: u8,
    pub bearing_deg: f64,
    pub tile_timeout: Duration,
    pub user_agent: String,
}

impl TileMosaicConfig {
    pub fn from_settings(settings: &SurfaceSettings) -> Self {
        Self {
            tile_url: settings.tile_url.clone(),
            viewport_width: settings.viewport_width,
            viewport_height: settings.viewport_height,
            max_native_zoom: settings.max_native_zoom,
            bearing_deg: settings.bearing_deg,
            tile_timeout: Duration::from_secs(settings.tile_timeout_secs),
            user_agent: USER_AGENT.to_string(),
        }
    }

    pub fn tile_url_for(&self, key: TileKey) -> String {
        self.tile_url
            .replace("{z}", &key.z.to_string())
            .replace("{x}", &key.x.to_string())
            .replace("{y}", &key.y.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone)]
enum TileSlot {
    Loading,
    Ready(Arc<RgbaImage>),
    Failed,
}

type TileCache = Arc<Mutex<HashMap<TileKey, TileSlot>>>;

pub struct TileMosaicSurface {
    config: TileMosaicConfig,
    http_client: reqwest::Client,
    view: ViewState,
    chrome_visible: bool,
    tiles: TileCache,
    loads: JoinSet<()>,
    visible: Vec<TileKey>,
}

impl TileMosaicSurface {
    pub fn new(config: TileMosaicConfig) -> Result<Self, SurfaceError> {
        if config.viewport_width == 0 || config.viewport_height == 0 {
            return Err(SurfaceError::Unavailable("viewport must be non-empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.tile_timeout)
            .build()
            .map_err(|e| SurfaceError::Unavailable(format!("HTTP client: {}", e)))?;

        let view = ViewState {
            center: LatLng::new(0.0, 0.0),
            zoom: 0.0,
            bearing_deg: config.bearing_deg,
        };

        Ok(Self {
            config,
            http_client,
            view,
            chrome_visible: true,
            tiles: Arc::new(Mutex::new(HashMap::new())),
            loads: JoinSet::new(),
            visible: Vec::new(),
        })
    }

    /// Rotate the view; the loaded tile set already covers any bearing
    pub fn set_bearing(&mut self, bearing_deg: f64) {
        self.view.bearing_deg = bearing_deg;
    }

    pub fn chrome_visible(&self) -> bool {
        self.chrome_visible
    }

    /// Zoom level tiles are fetched at for the current view
    pub fn tile_zoom(&self) -> u8 {
        tile_zoom_for(self.view.zoom, self.config.max_native_zoom)
    }

    pub fn visible_tiles(&self) -> &[TileKey] {
        &self.visible
    }

    /// Tiles held in the cache, loaded or not
    pub async fn cached_tile_count(&self) -> usize {
        self.tiles.lock().await.len()
    }

    /// Abort in-flight downloads and forget their slots
    async fn cancel_pending(&mut self) {
        self.loads.abort_all();
        while self.loads.join_next().await.is_some() {}

        let mut tiles = self.tiles.lock().await;
        tiles.retain(|_, slot| !matches!(slot, TileSlot::Loading));
    }

    /// Drop every cached tile outside the current visible set
    ///
    /// The cache never holds more than one view's worth of tiles.
    async fn evict_hidden(&mut self) {
        let visible: HashSet<TileKey> = self.visible.iter().copied().collect();
        let mut tiles = self.tiles.lock().await;
        let before = tiles.len();
        tiles.retain(|key, _| visible.contains(key));
        let evicted = before - tiles.len();
        if evicted > 0 {
            debug!(evicted, kept = tiles.len(), "Evicted hidden tiles");
        }
    }

    async fn request_visible(&mut self) {
        let mut tiles = self.tiles.lock().await;
        for &key in &self.visible {
            if matches!(tiles.get(&key), Some(TileSlot::Ready(_)) | Some(TileSlot::Loading)) {
                continue;
            }
            tiles.insert(key, TileSlot::Loading);

            let url = self.config.tile_url_for(key);
            let client = self.http_client.clone();
            let cache = Arc::clone(&self.tiles);
            self.loads.spawn(async move {
                let slot = match fetch_tile(&client, &url, key).await {
                    Ok(image) => TileSlot::Ready(Arc::new(image)),
                    Err(e) => {
                        warn!(url = %url, error = %e, "Tile load failed");
                        TileSlot::Failed
                    }
                };
                cache.lock().await.insert(key, slot);
            });
        }
        debug!(
            tiles = self.visible.len(),
            zoom = self.view.zoom,
            "Requested visible tiles"
        );
    }
}

#[async_trait]
impl RenderingSurface for TileMosaicSurface {
    async fn recenter(&mut self, command: &ViewCommand) -> Result<(), SurfaceError> {
        validate_view(command)?;
        self.cancel_pending().await;

        self.view.center = command.center;
        self.view.zoom = command.zoom;
        self.visible = visible_tile_keys(
            command.center,
            command.zoom,
            self.config.max_native_zoom,
            self.config.viewport_width,
            self.config.viewport_height,
        );
        self.evict_hidden().await;
        self.request_visible().await;
        Ok(())
    }

    fn view(&self) -> ViewState {
        self.view
    }

    async fn tile_readiness(&mut self) -> TileReadiness {
        let tiles = self.tiles.lock().await;
        let ready = self
            .visible
            .iter()
            .filter(|key| matches!(tiles.get(key), Some(TileSlot::Ready(_))))
            .count();
        TileReadiness {
            ready,
            visible: self.visible.len(),
        }
    }

    fn set_chrome_visible(&mut self, visible: bool) -> bool {
        std::mem::replace(&mut self.chrome_visible, visible)
    }

    async fn snapshot(&mut self, render_scale: f64) -> Result<SurfaceFrame, SurfaceError> {
        if !(render_scale.is_finite() && render_scale > 0.0) {
            return Err(SurfaceError::Unavailable(format!(
                "invalid render scale {}",
                render_scale
            )));
        }
        let width = (f64::from(self.config.viewport_width) * render_scale).round();
        let height = (f64::from(self.config.viewport_height) * render_scale).round();
        if width < 1.0 || height < 1.0 || width > MAX_SNAPSHOT_EDGE || height > MAX_SNAPSHOT_EDGE {
            return Err(SurfaceError::Unavailable(format!(
                "snapshot size {}x{} out of range",
                width, height
            )));
        }

        let loaded: HashMap<TileKey, Arc<RgbaImage>> = {
            let tiles = self.tiles.lock().await;
            self.visible
                .iter()
                .filter_map(|key| match tiles.get(key) {
                    Some(TileSlot::Ready(image)) => Some((*key, Arc::clone(image))),
                    _ => None,
                })
                .collect()
        };

        let plan = RenderPlan {
            view: self.view,
            tile_zoom: self.tile_zoom(),
            logical_width: self.config.viewport_width,
            logical_height: self.config.viewport_height,
            width: width as u32,
            height: height as u32,
            render_scale,
            chrome_visible: self.chrome_visible,
        };

        let image = tokio::task::spawn_blocking(move || plan.render(&loaded))
            .await
            .map_err(|e| SurfaceError::Unavailable(format!("render task failed: {}", e)))?;

        Ok(SurfaceFrame {
            image,
            logical_width: self.config.viewport_width,
            logical_height: self.config.viewport_height,
        })
    }
}

async fn fetch_tile(client: &reqwest::Client, url: &str, key: TileKey) -> Result<RgbaImage, SurfaceError> {
    let tile_error = |reason: String| SurfaceError::Tile {
        z: key.z,
        x: key.x,
        y: key.y,
        reason,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| tile_error(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(tile_error(format!("HTTP {}", status.as_u16())));
    }

    let bytes = response.bytes().await.map_err(|e| tile_error(e.to_string()))?;
    let decoded = image::load_from_memory(&bytes).map_err(|e| tile_error(e.to_string()))?;
    Ok(decoded.to_rgba8())
}

/// Integer tile zoom for a fractional view zoom
pub fn tile_zoom_for(zoom: f64, max_native_zoom: u8) -> u8 {
    zoom.round().clamp(0.0, f64::from(max_native_zoom)) as u8
}

/// Tiles intersecting the disc circumscribing the viewport
///
/// X wraps around the antimeridian; Y is clamped to the world.
pub fn visible_tile_keys(
    center: LatLng,
    zoom: f64,
    max_native_zoom: u8,
    viewport_width: u32,
    viewport_height: u32,
) -> Vec<TileKey> {
    let tz = tile_zoom_for(zoom, max_native_zoom);
    let tiles_per_axis = 1i64 << tz;
    let scale = 2f64.powf(zoom - f64::from(tz));

    let (cx, cy) = lat_lng_to_global_px(center, f64::from(tz));
    let radius = f64::from(viewport_width).hypot(f64::from(viewport_height)) / 2.0 / scale;

    let x_min = ((cx - radius) / TILE_SIZE).floor() as i64;
    let x_max = ((cx + radius) / TILE_SIZE).floor() as i64;
    let y_min = (((cy - radius) / TILE_SIZE).floor() as i64).max(0);
    let y_max = (((cy + radius) / TILE_SIZE).floor() as i64).min(tiles_per_axis - 1);

    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for y in y_min..=y_max {
        for x in x_min..=x_max {
            let key = TileKey {
                z: tz,
                x: x.rem_euclid(tiles_per_axis) as u32,
                y: y as u32,
            };
            if seen.insert(key) {
                keys.push(key);
            }
        }
    }
    keys
}

/// Everything needed to rasterize one snapshot off the async runtime
struct RenderPlan {
    view: ViewState,
    tile_zoom: u8,
    logical_width: u32,
    logical_height: u32,
    width: u32,
    height: u32,
    render_scale: f64,
    chrome_visible: bool,
}

impl RenderPlan {
    fn render(&self, tiles: &HashMap<TileKey, Arc<RgbaImage>>) -> RgbaImage {
        let tz = f64::from(self.tile_zoom);
        let to_tile_px = 2f64.powf(tz - self.view.zoom);
        let tiles_per_axis = 1i64 << self.tile_zoom;
        let (cx, cy) = lat_lng_to_global_px(self.view.center, self.view.zoom);
        let half_w = f64::from(self.logical_width) / 2.0;
        let half_h = f64::from(self.logical_height) / 2.0;
        // Screen offsets are turned back to north-up by -bearing (see geo::rotate_pixel)
        let (sin, cos) = (-self.view.bearing_deg).to_radians().sin_cos();

        let mut out = RgbaImage::from_pixel(self.width, self.height, EMPTY_COLOR);
        for (ox, oy, pixel) in out.enumerate_pixels_mut() {
            let dx = (f64::from(ox) + 0.5) / self.render_scale - half_w;
            let dy = (f64::from(oy) + 0.5) / self.render_scale - half_h;
            let mx = dx * cos + dy * sin;
            let my = -dx * sin + dy * cos;

            let tx = (cx + mx) * to_tile_px;
            let ty = (cy + my) * to_tile_px;
            let col = (tx / TILE_SIZE).floor() as i64;
            let row = (ty / TILE_SIZE).floor() as i64;
            if row < 0 || row >= tiles_per_axis {
                continue;
            }

            let key = TileKey {
                z: self.tile_zoom,
                x: col.rem_euclid(tiles_per_axis) as u32,
                y: row as u32,
            };
            let Some(tile) = tiles.get(&key) else {
                continue;
            };

            let fx = (tx - col as f64 * TILE_SIZE) / TILE_SIZE;
            let fy = (ty - row as f64 * TILE_SIZE) / TILE_SIZE;
            let px = ((fx * f64::from(tile.width())) as u32).min(tile.width().saturating_sub(1));
            let py = ((fy * f64::from(tile.height())) as u32).min(tile.height().saturating_sub(1));
            *pixel = *tile.get_pixel(px, py);
        }

        if self.chrome_visible {
            self.draw_crosshair(&mut out);
        }
        out
    }

    fn draw_crosshair(&self, out: &mut RgbaImage) {
        let cx = out.width() / 2;
        let cy = out.height() / 2;
        let half = (CROSSHAIR_HALF_LEN * self.render_scale).round() as u32;

        for x in cx.saturating_sub(half)..=(cx + half).min(out.width() - 1) {
            out.put_pixel(x, cy, CROSSHAIR_COLOR);
        }
        for y in cy.saturating_sub(half)..=(cy + half).min(out.height() - 1) {
            out.put_pixel(cx, y, CROSSHAIR_COLOR);
        }
    }
}
