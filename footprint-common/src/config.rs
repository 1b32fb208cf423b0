//! Configuration file model and resolution
//!
//! Config file lookup follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. `FOOTPRINT_CONFIG` environment variable
//! 3. `<config_dir>/footprint/<module>.toml`
//! 4. Built-in defaults (fallback)
//!
//! An explicitly named file (CLI or environment) must exist and parse. A
//! missing file at the default location is not an error: the built-in
//! defaults are used and a message is logged.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "FOOTPRINT_CONFIG";

/// Bitmap encoding sent to the oracles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub harvest: HarvestSettings,
    pub capture: CaptureSettings,
    pub oracles: OracleSettings,
    pub surface: SurfaceSettings,
    pub export: ExportSettings,
    pub logging: LoggingConfig,
}

/// Harmonization and capture geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Zoom used while harmonizing a target
    pub target_zoom: f64,
    /// Zoom of the final (segmentation) capture; `target_zoom` when unset
    pub final_zoom: Option<f64>,
    /// Edge of the square center crop, logical pixels
    pub crop_size_px: u32,
    /// Upper bound on refinement oracle calls per target
    pub max_iterations: u32,
    /// Pause between non-converged refinement steps
    pub iteration_delay_ms: u64,
    /// Surface pixel-density scale for snapshots
    pub render_scale: f64,
    pub image_format: ImageFormat,
    /// Encoder quality in [0, 1] (JPEG only)
    pub quality: f64,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            target_zoom: 18.8,
            final_zoom: None,
            crop_size_px: 500,
            max_iterations: 5,
            iteration_delay_ms: 200,
            render_scale: 1.0,
            image_format: ImageFormat::Jpeg,
            quality: 0.9,
        }
    }
}

impl HarvestSettings {
    pub fn effective_final_zoom(&self) -> f64 {
        self.final_zoom.unwrap_or(self.target_zoom)
    }
}

/// Frame stabilization and degenerate-capture rejection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub min_ready_tiles: usize,
    pub settle_max_wait_ms: u64,
    /// Shorter settle budget used between capture retries
    pub retry_settle_wait_ms: u64,
    /// Capture attempts before the failure becomes fatal
    pub max_attempts: u32,
    /// Mean sampled luminance (0-255) under which a capture is rejected
    pub black_luminance_threshold: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            min_ready_tiles: 6,
            settle_max_wait_ms: 900,
            retry_settle_wait_ms: 300,
            max_attempts: 3,
            black_luminance_threshold: 6.0,
        }
    }
}

/// Remote oracle endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub refinement_url: String,
    pub segmentation_url: String,
    /// Watchdog applied to every oracle call
    pub timeout_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            refinement_url: "http://localhost:8000/update_centered_coord".to_string(),
            segmentation_url: "http://localhost:9000/segmenta_ai".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Headless tile-mosaic surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSettings {
    /// XYZ template with `{z}`, `{x}` and `{y}` placeholders
    pub tile_url: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub max_native_zoom: u8,
    pub bearing_deg: f64,
    pub tile_timeout_secs: u64,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            tile_url: "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
                .to_string(),
            viewport_width: 1024,
            viewport_height: 768,
            max_native_zoom: 19,
            bearing_deg: 0.0,
            tile_timeout_secs: 10,
        }
    }
}

/// Tabular export location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    pub file_prefix: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "poligoni".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let h = &self.harvest;
        for (name, zoom) in [("target_zoom", h.target_zoom), ("final_zoom", h.effective_final_zoom())] {
            if !(0.0..=24.0).contains(&zoom) {
                return Err(Error::Config(format!("harvest.{} must be within [0, 24], got {}", name, zoom)));
            }
        }
        if h.crop_size_px == 0 {
            return Err(Error::Config("harvest.crop_size_px must be positive".to_string()));
        }
        if h.max_iterations == 0 {
            return Err(Error::Config("harvest.max_iterations must be at least 1".to_string()));
        }
        if !(h.render_scale.is_finite() && h.render_scale > 0.0) {
            return Err(Error::Config(format!("harvest.render_scale must be positive, got {}", h.render_scale)));
        }
        if !(0.0..=1.0).contains(&h.quality) {
            return Err(Error::Config(format!("harvest.quality must be within [0, 1], got {}", h.quality)));
        }
        if self.capture.max_attempts == 0 {
            return Err(Error::Config("capture.max_attempts must be at least 1".to_string()));
        }
        if self.surface.viewport_width == 0 || self.surface.viewport_height == 0 {
            return Err(Error::Config("surface viewport must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    DefaultLocation(PathBuf),
    BuiltIn,
}

/// Resolves and loads the config file for one module
pub struct ConfigResolver {
    module_name: String,
}

impl ConfigResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
        }
    }

    /// Default file location for this module, if the platform has a config dir
    pub fn default_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("footprint").join(format!("{}.toml", self.module_name)))
    }

    /// Load the highest-priority configuration available
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            let config = load_toml_config(path)?;
            info!("Configuration loaded from command line: {}", path.display());
            return Ok((config, ConfigSource::CommandLine(path.to_path_buf())));
        }

        // Priority 2: Environment variable
        if let Ok(value) = std::env::var(CONFIG_ENV_VAR) {
            if !value.trim().is_empty() {
                let path = PathBuf::from(value);
                let config = load_toml_config(&path)?;
                info!("Configuration loaded from {}: {}", CONFIG_ENV_VAR, path.display());
                return Ok((config, ConfigSource::Environment(path)));
            }
        }

        // Priority 3: Default location (optional)
        if let Some(path) = self.default_path() {
            if path.exists() {
                let config = load_toml_config(&path)?;
                info!("Configuration loaded from {}", path.display());
                return Ok((config, ConfigSource::DefaultLocation(path)));
            }
        }

        // Priority 4: Built-in defaults
        warn!(
            module = %self.module_name,
            "No configuration file found, using built-in defaults"
        );
        Ok((TomlConfig::default(), ConfigSource::BuiltIn))
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp = target.with_extension("toml.tmp");
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, target)?;
    Ok(())
}
