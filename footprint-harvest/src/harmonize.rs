//! Harmonization loop
//!
//! Converges a target's coordinate on the refinement oracle's idea of the
//! visual center: recenter, capture, ask the oracle, move, repeat.
//!
//! The first request carries only the target id and the oracle resolves the
//! starting point itself. Every later request carries the loop's current
//! estimate, since the oracle keeps no state between calls.

use crate::capture::FrameAcquirer;
use crate::error::HarvestError;
use crate::models::{CaptureRequest, HarmonizationOutcome, Target, ViewCommand};
use crate::oracle::{RefinementOracle, RefinementRequest};
use crate::reporter::BatchReporter;
use crate::surface::RenderingSurface;
use footprint_common::config::HarvestSettings;
use footprint_common::events::LogEntry;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizationConfig {
    pub zoom: f64,
    /// Hard upper bound on oracle calls per target
    pub max_iterations: u32,
    /// Pause after a non-converged step
    pub iteration_delay: Duration,
    pub capture: CaptureRequest,
}

impl HarmonizationConfig {
    pub fn from_settings(settings: &HarvestSettings) -> Self {
        Self {
            zoom: settings.target_zoom,
            max_iterations: settings.max_iterations,
            iteration_delay: Duration::from_millis(settings.iteration_delay_ms),
            capture: CaptureRequest::from_settings(settings),
        }
    }
}

pub struct HarmonizationLoop {
    config: HarmonizationConfig,
}

impl HarmonizationLoop {
    pub fn new(config: HarmonizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarmonizationConfig {
        &self.config
    }

    /// Run the loop for one target
    ///
    /// Running out of iterations is not an error: the last estimate is
    /// returned with `converged = false`. Capture and oracle failures abort
    /// the loop.
    pub async fn run(
        &self,
        surface: &mut dyn RenderingSurface,
        acquirer: &FrameAcquirer,
        oracle: &dyn RefinementOracle,
        target: &Target,
        reporter: &dyn BatchReporter,
    ) -> Result<HarmonizationOutcome, HarvestError> {
        let mut outcome = HarmonizationOutcome {
            position: target.position(),
            steps: 0,
            converged: false,
            last_distance_px: None,
            last_density_score: None,
        };

        for step in 1..=self.config.max_iterations {
            surface
                .recenter(&ViewCommand::jump(outcome.position, self.config.zoom))
                .await?;
            let capture = acquirer.acquire(surface, &self.config.capture).await?;

            let (lat, lng) = if step == 1 {
                (None, None)
            } else {
                (Some(outcome.position.lat), Some(outcome.position.lng))
            };
            let request = RefinementRequest {
                id: target.id.clone(),
                zoom: capture.zoom,
                crop_size: capture.crop_size_px,
                image: capture.image.to_data_url(),
                bearing: capture.bearing_deg,
                lat,
                lng,
            };

            let result = oracle.refine(&request).await?;

            outcome.position = result.position;
            outcome.steps = step;
            outcome.last_distance_px = result.final_distance_px;
            outcome.last_density_score = result.density_score;
            outcome.converged = result.is_converged();

            info!(
                target_id = %target.id,
                step,
                distance_px = ?result.final_distance_px,
                density_score = ?result.density_score,
                oracle_iterations = ?result.iterations,
                converged = outcome.converged,
                "Refinement step"
            );
            reporter.on_log(LogEntry::info(
                Some(&target.id),
                step_message(step, self.config.max_iterations, &result),
            ));

            if outcome.converged {
                return Ok(outcome);
            }
            if step < self.config.max_iterations {
                tokio::time::sleep(self.config.iteration_delay).await;
            }
        }

        warn!(
            target_id = %target.id,
            steps = outcome.steps,
            "Harmonization did not converge"
        );
        reporter.on_log(LogEntry::warn(
            Some(&target.id),
            format!(
                "not converged after {} steps, keeping last estimate {}",
                outcome.steps, outcome.position
            ),
        ));
        Ok(outcome)
    }
}

fn step_message(step: u32, max: u32, result: &crate::oracle::RefinementStep) -> String {
    let mut text = format!(
        "step {}/{}: distance {} px, density {}",
        step,
        max,
        format_metric(result.final_distance_px),
        format_metric(result.density_score),
    );
    if let Some(message) = result.message.as_deref().filter(|m| !m.is_empty()) {
        text.push_str(" - ");
        text.push_str(message);
    }
    text
}

fn format_metric(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}", v),
        None => "n/a".to_string(),
    }
}
