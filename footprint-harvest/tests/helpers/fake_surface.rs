//! Scripted rendering surface
//!
//! Renders solid-color frames, records every recenter and the chrome
//! visibility seen by each snapshot.

use async_trait::async_trait;
use footprint_common::LatLng;
use footprint_harvest::error::SurfaceError;
use footprint_harvest::models::{ViewCommand, ViewState};
use footprint_harvest::surface::{RenderingSurface, SurfaceFrame, TileReadiness};
use image::{Rgba, RgbaImage};
use std::collections::VecDeque;

pub const GRAY: [u8; 4] = [128, 128, 128, 255];
pub const BLACK: [u8; 4] = [0, 0, 0, 255];

pub struct FakeSurface {
    pub view: ViewState,
    pub chrome_visible: bool,
    pub logical_width: u32,
    pub logical_height: u32,
    /// Colors for the next snapshots, in order
    pub scripted_frames: VecDeque<[u8; 4]>,
    /// Color once the script is exhausted
    pub default_color: [u8; 4],
    pub readiness: TileReadiness,
    pub fail_snapshots: bool,

    pub recenters: Vec<ViewCommand>,
    pub snapshots: usize,
    pub chrome_during_snapshots: Vec<bool>,
}

impl FakeSurface {
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            view: ViewState {
                center: LatLng::new(0.0, 0.0),
                zoom: 0.0,
                bearing_deg: 0.0,
            },
            chrome_visible: true,
            logical_width: 800,
            logical_height: 600,
            scripted_frames: VecDeque::new(),
            default_color: color,
            readiness: TileReadiness { ready: 6, visible: 6 },
            fail_snapshots: false,
            recenters: Vec::new(),
            snapshots: 0,
            chrome_during_snapshots: Vec::new(),
        }
    }

    pub fn gray() -> Self {
        Self::solid(GRAY)
    }

    pub fn black() -> Self {
        Self::solid(BLACK)
    }

    pub fn with_frames(mut self, frames: &[[u8; 4]]) -> Self {
        self.scripted_frames = frames.iter().copied().collect();
        self
    }

    pub fn with_bearing(mut self, bearing_deg: f64) -> Self {
        self.view.bearing_deg = bearing_deg;
        self
    }
}

#[async_trait]
impl RenderingSurface for FakeSurface {
    async fn recenter(&mut self, command: &ViewCommand) -> Result<(), SurfaceError> {
        self.recenters.push(*command);
        self.view.center = command.center;
        self.view.zoom = command.zoom;
        Ok(())
    }

    fn view(&self) -> ViewState {
        self.view
    }

    async fn tile_readiness(&mut self) -> TileReadiness {
        self.readiness
    }

    fn set_chrome_visible(&mut self, visible: bool) -> bool {
        std::mem::replace(&mut self.chrome_visible, visible)
    }

    async fn snapshot(&mut self, render_scale: f64) -> Result<SurfaceFrame, SurfaceError> {
        self.snapshots += 1;
        self.chrome_during_snapshots.push(self.chrome_visible);
        if self.fail_snapshots {
            return Err(SurfaceError::Unavailable("scripted failure".to_string()));
        }

        let color = self.scripted_frames.pop_front().unwrap_or(self.default_color);
        let width = (f64::from(self.logical_width) * render_scale).round() as u32;
        let height = (f64::from(self.logical_height) * render_scale).round() as u32;
        Ok(SurfaceFrame {
            image: RgbaImage::from_pixel(width, height, Rgba(color)),
            logical_width: self.logical_width,
            logical_height: self.logical_height,
        })
    }
}
