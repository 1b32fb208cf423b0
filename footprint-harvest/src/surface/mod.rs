//! Rendering surface capability
//!
//! The pipeline never reaches for ambient map state. Everything it needs
//! from the thing that draws imagery goes through [`RenderingSurface`]:
//! move the view, ask how many visible tiles are loaded, hide the overlay
//! chrome, and take a snapshot.
//!
//! A surface is exclusive-use. Callers hold `&mut` for the whole time a
//! target's pipeline runs, so no other actor can recenter it mid-capture.

pub mod tile_mosaic;

pub use tile_mosaic::{TileMosaicConfig, TileMosaicSurface};

use crate::error::SurfaceError;
use crate::models::{ViewCommand, ViewState};
use async_trait::async_trait;
use image::RgbaImage;
use std::ops::{Deref, DerefMut};

/// Loaded vs. visible tile counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileReadiness {
    pub ready: usize,
    pub visible: usize,
}

/// Full-surface bitmap
///
/// `image` is `logical_width · scale` pixels wide; the acquirer derives the
/// pixel density from the ratio.
#[derive(Debug, Clone)]
pub struct SurfaceFrame {
    pub image: RgbaImage,
    pub logical_width: u32,
    pub logical_height: u32,
}

#[async_trait]
pub trait RenderingSurface: Send {
    /// Move the view; pending loads for the previous view are dropped
    async fn recenter(&mut self, command: &ViewCommand) -> Result<(), SurfaceError>;

    fn view(&self) -> ViewState;

    async fn tile_readiness(&mut self) -> TileReadiness;

    /// Show or hide overlay chrome; returns the previous visibility
    fn set_chrome_visible(&mut self, visible: bool) -> bool;

    async fn snapshot(&mut self, render_scale: f64) -> Result<SurfaceFrame, SurfaceError>;
}

/// Reject commands no surface can honor
pub fn validate_view(command: &ViewCommand) -> Result<(), SurfaceError> {
    if !command.center.is_finite() {
        return Err(SurfaceError::InvalidView(format!(
            "non-finite center {}",
            command.center
        )));
    }
    if !(0.0..=24.0).contains(&command.zoom) {
        return Err(SurfaceError::InvalidView(format!(
            "zoom {} outside [0, 24]",
            command.zoom
        )));
    }
    Ok(())
}

/// Scoped clean-capture mode
///
/// Hides chrome on creation and restores the previous visibility when
/// dropped, whichever way the capture exits.
pub struct CleanCapture<'a> {
    surface: &'a mut dyn RenderingSurface,
    previous: bool,
}

impl<'a> CleanCapture<'a> {
    pub fn begin(surface: &'a mut dyn RenderingSurface) -> Self {
        let previous = surface.set_chrome_visible(false);
        Self { surface, previous }
    }
}

impl<'a> Deref for CleanCapture<'a> {
    type Target = dyn RenderingSurface + 'a;

    fn deref(&self) -> &Self::Target {
        self.surface
    }
}

impl<'a> DerefMut for CleanCapture<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.surface
    }
}

impl Drop for CleanCapture<'_> {
    fn drop(&mut self) {
        self.surface.set_chrome_visible(self.previous);
    }
}
