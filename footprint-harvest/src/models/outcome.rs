//! Per-target and per-run results

use super::{BatchRun, OutputRow};
use footprint_common::LatLng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result of converging one target's coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonizationOutcome {
    /// Best-effort position (last oracle estimate)
    pub position: LatLng,
    /// Refinement calls made, never more than the configured maximum
    pub steps: u32,
    pub converged: bool,
    pub last_distance_px: Option<f64>,
    pub last_density_score: Option<f64>,
}

/// Pipeline stage a target failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Harmonization,
    FinalCapture,
    Segmentation,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Harmonization => "harmonization",
            PipelineStage::FinalCapture => "final capture",
            PipelineStage::Segmentation => "segmentation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetStatus {
    Succeeded {
        polygons: usize,
        harmonization: HarmonizationOutcome,
    },
    Failed {
        stage: PipelineStage,
        error: String,
    },
}

/// What happened to one target of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOutcome {
    /// Zero-based position in the input list
    pub index: usize,
    pub target_id: String,
    pub status: TargetStatus,
    pub duration_ms: u64,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, TargetStatus::Succeeded { .. })
    }
}

/// Everything a finished (or cancelled) run produced
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run: BatchRun,
    /// Grouped by target, in processing order
    pub rows: Vec<OutputRow>,
    pub outcomes: Vec<TargetOutcome>,
    /// None when no sink is configured or the export failed
    pub export_path: Option<PathBuf>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}
