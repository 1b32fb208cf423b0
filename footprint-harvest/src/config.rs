//! Configuration resolution for footprint-harvest
//!
//! Oracle endpoints resolve with CLI → ENV → TOML priority. Everything else
//! comes from the config file (see `footprint_common::config`).

use footprint_common::config::{OracleSettings, TomlConfig};
use footprint_common::{Error, Result};
use tracing::{info, warn};

pub const REFINEMENT_URL_ENV: &str = "FOOTPRINT_REFINEMENT_URL";
pub const SEGMENTATION_URL_ENV: &str = "FOOTPRINT_SEGMENTATION_URL";

/// Effective oracle endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleEndpoints {
    pub refinement_url: String,
    pub segmentation_url: String,
}

/// Resolve both oracle URLs
pub fn resolve_oracle_endpoints(
    cli_refinement: Option<&str>,
    cli_segmentation: Option<&str>,
    toml_config: &TomlConfig,
) -> Result<OracleEndpoints> {
    let refinement_env = std::env::var(REFINEMENT_URL_ENV).ok();
    let segmentation_env = std::env::var(SEGMENTATION_URL_ENV).ok();
    let defaults = OracleSettings::default();
    let oracles = &toml_config.oracles;

    Ok(OracleEndpoints {
        refinement_url: resolve_url(
            "refinement oracle URL",
            cli_refinement,
            refinement_env.as_deref(),
            explicit(&oracles.refinement_url, &defaults.refinement_url),
            &defaults.refinement_url,
        )?,
        segmentation_url: resolve_url(
            "segmentation oracle URL",
            cli_segmentation,
            segmentation_env.as_deref(),
            explicit(&oracles.segmentation_url, &defaults.segmentation_url),
            &defaults.segmentation_url,
        )?,
    })
}

/// TOML value, unless it is just the built-in default
fn explicit<'a>(value: &'a str, default: &str) -> Option<&'a str> {
    (value.trim() != default).then_some(value)
}

/// Pick the highest-priority non-empty value
///
/// **Priority:** CLI → ENV → TOML → built-in default. Only the first three
/// count as sources for the multiple-sources warning.
pub fn resolve_url(
    name: &str,
    cli: Option<&str>,
    env: Option<&str>,
    toml: Option<&str>,
    default: &str,
) -> Result<String> {
    let candidates = [("command line", cli), ("environment", env), ("TOML", toml)];
    let mut present: Vec<(&str, &str)> = candidates
        .iter()
        .filter_map(|(source, value)| value.map(str::trim).filter(|v| !v.is_empty()).map(|v| (*source, v)))
        .collect();

    // Warn if multiple sources (potential misconfiguration)
    if present.len() > 1 {
        let sources: Vec<&str> = present.iter().map(|(s, _)| *s).collect();
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            name,
            sources.join(", "),
            sources[0]
        );
    }

    let default = default.trim();
    if present.is_empty() && !default.is_empty() {
        present.push(("built-in default", default));
    }

    let Some(&(source, value)) = present.first() else {
        return Err(Error::Config(format!("{} is not configured", name)));
    };

    if !is_valid_url(value) {
        return Err(Error::Config(format!("{} from {} is not an http(s) URL: {}", name, source, value)));
    }

    info!("{} loaded from {}", name, source);
    Ok(value.to_string())
}

fn is_valid_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
