//! Batch orchestration
//!
//! Sequences targets through harmonize → final capture → segmentation →
//! projection, one at a time and in list order. A failing target is logged
//! and skipped; the batch always runs to the end (or to an abort request)
//! and always hands whatever rows it has to the sink.
//!
//! The orchestrator owns its surface and `run` takes `&mut self`, so one
//! run at a time holds the surface and nothing else can move it.

use crate::capture::{AcquirePolicy, FrameAcquirer};
use crate::error::HarvestError;
use crate::harmonize::{HarmonizationConfig, HarmonizationLoop};
use crate::models::{
    BatchReport, BatchRun, CaptureRequest, CaptureResult, HarmonizationOutcome, OutputRow,
    PipelineStage, RunState, Target, TargetOutcome, TargetStatus, ViewCommand,
};
use crate::oracle::{RefinementOracle, SegmentationOracle, SegmentationRequest};
use crate::projector::convert_polygons;
use crate::reporter::BatchReporter;
use crate::sink::ResultSink;
use crate::surface::RenderingSurface;
use footprint_common::config::{HarvestSettings, TomlConfig};
use footprint_common::events::LogEntry;
use footprint_common::LatLng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-run pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub harmonization: HarmonizationConfig,
    pub final_zoom: f64,
    pub final_capture: CaptureRequest,
}

impl BatchConfig {
    pub fn from_settings(settings: &HarvestSettings) -> Self {
        Self {
            harmonization: HarmonizationConfig::from_settings(settings),
            final_zoom: settings.effective_final_zoom(),
            final_capture: CaptureRequest::from_settings(settings),
        }
    }
}

type StageResult<T> = Result<T, (PipelineStage, HarvestError)>;

pub struct BatchOrchestrator<S: RenderingSurface> {
    surface: S,
    acquirer: FrameAcquirer,
    harmonizer: HarmonizationLoop,
    refinement: Arc<dyn RefinementOracle>,
    segmentation: Arc<dyn SegmentationOracle>,
    sink: Option<Box<dyn ResultSink>>,
    final_zoom: f64,
    final_capture: CaptureRequest,
}

impl<S: RenderingSurface> BatchOrchestrator<S> {
    pub fn new(
        surface: S,
        refinement: Arc<dyn RefinementOracle>,
        segmentation: Arc<dyn SegmentationOracle>,
        config: BatchConfig,
        policy: AcquirePolicy,
    ) -> Self {
        Self {
            surface,
            acquirer: FrameAcquirer::new(policy),
            harmonizer: HarmonizationLoop::new(config.harmonization),
            refinement,
            segmentation,
            sink: None,
            final_zoom: config.final_zoom,
            final_capture: config.final_capture,
        }
    }

    /// Orchestrator with every setting taken from a config file
    pub fn from_config(
        surface: S,
        refinement: Arc<dyn RefinementOracle>,
        segmentation: Arc<dyn SegmentationOracle>,
        config: &TomlConfig,
    ) -> Self {
        Self::new(
            surface,
            refinement,
            segmentation,
            BatchConfig::from_settings(&config.harvest),
            AcquirePolicy::from_settings(&config.capture),
        )
    }

    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Process every target in order
    ///
    /// `cancel` is honored between targets only; a target in flight always
    /// finishes (or fails) first. The returned report carries the rows even
    /// when the export failed.
    pub async fn run(
        &mut self,
        targets: &[Target],
        reporter: &dyn BatchReporter,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let total = targets.len();
        let mut run = BatchRun::new(total);
        reporter.on_run_started(&run);
        change_state(&mut run, RunState::Processing);
        info!(run_id = %run.run_id, total, "Batch run started");

        let mut rows: Vec<OutputRow> = Vec::new();
        let mut outcomes = Vec::with_capacity(total);

        for (index, target) in targets.iter().enumerate() {
            let ordinal = index + 1;
            if cancel.is_cancelled() {
                warn!(run_id = %run.run_id, remaining = total - index, "Batch run cancelled");
                reporter.on_log(LogEntry::warn(
                    None,
                    format!("run cancelled, {} of {} targets not processed", total - index, total),
                ));
                change_state(&mut run, RunState::Cancelled);
                break;
            }

            reporter.on_status(&format!("({}/{}) {} • harmonizing", ordinal, total, target.id));
            reporter.on_target_started(index, total, &target.id);
            let started = Instant::now();

            let status = match self.process_target(ordinal, total, target, reporter).await {
                Ok((target_rows, harmonization)) => {
                    let polygons = target_rows.len();
                    reporter.on_log(LogEntry::info(
                        Some(&target.id),
                        format!("{} polygons at {}", polygons, harmonization.position),
                    ));
                    rows.extend(target_rows);
                    TargetStatus::Succeeded {
                        polygons,
                        harmonization,
                    }
                }
                Err((stage, error)) => {
                    warn!(
                        target_id = %target.id,
                        stage = %stage,
                        transport = error.is_transport(),
                        error = %error,
                        "Target failed"
                    );
                    reporter.on_log(LogEntry::error(
                        Some(&target.id),
                        format!("{} failed for {}: {}", stage, target.id, error),
                    ));
                    TargetStatus::Failed {
                        stage,
                        error: error.to_string(),
                    }
                }
            };

            let outcome = TargetOutcome {
                index,
                target_id: target.id.clone(),
                status,
                duration_ms: started.elapsed().as_millis() as u64,
            };
            reporter.on_target_finished(&outcome);
            outcomes.push(outcome);

            run.update_progress(ordinal, Some(target.id.clone()));
            reporter.on_progress(ordinal, total);
        }

        if !run.is_terminal() {
            change_state(&mut run, RunState::Completed);
        }

        let export_path = self.export(&rows, reporter);

        let report = BatchReport {
            run,
            rows,
            outcomes,
            export_path,
        };

        let verb = if report.run.state == RunState::Cancelled {
            "Cancelled"
        } else {
            "Done"
        };
        reporter.on_status(&format!(
            "{}: {} polygons from {}/{} targets ({} failed)",
            verb,
            report.rows.len(),
            report.succeeded(),
            total,
            report.failed()
        ));
        info!(
            run_id = %report.run.run_id,
            rows = report.rows.len(),
            failed = report.failed(),
            state = ?report.run.state,
            "Batch run finished"
        );
        reporter.on_run_finished(&report);
        report
    }

    async fn process_target(
        &mut self,
        ordinal: usize,
        total: usize,
        target: &Target,
        reporter: &dyn BatchReporter,
    ) -> StageResult<(Vec<OutputRow>, HarmonizationOutcome)> {
        let harmonization = self
            .harmonizer
            .run(
                &mut self.surface,
                &self.acquirer,
                self.refinement.as_ref(),
                target,
                reporter,
            )
            .await
            .map_err(|e| (PipelineStage::Harmonization, e))?;

        reporter.on_status(&format!("({}/{}) {} • capturing", ordinal, total, target.id));
        let capture = self
            .final_capture(harmonization.position)
            .await
            .map_err(|e| (PipelineStage::FinalCapture, e))?;

        reporter.on_status(&format!("({}/{}) {} • segmenting", ordinal, total, target.id));
        let request = SegmentationRequest::from_capture(&capture);
        let polygons = self
            .segmentation
            .segment(&request)
            .await
            .map_err(|e| (PipelineStage::Segmentation, HarvestError::from(e)))?;

        let rows = convert_polygons(&polygons, &capture)
            .iter()
            .map(|polygon| OutputRow::new(&target.id, polygon, harmonization.position))
            .collect();

        Ok((rows, harmonization))
    }

    async fn final_capture(
        &mut self,
        position: LatLng,
    ) -> Result<CaptureResult, HarvestError> {
        self.surface
            .recenter(&ViewCommand::jump(position, self.final_zoom))
            .await?;
        let capture = self
            .acquirer
            .acquire(&mut self.surface, &self.final_capture)
            .await?;
        Ok(capture)
    }

    fn export(&self, rows: &[OutputRow], reporter: &dyn BatchReporter) -> Option<PathBuf> {
        let sink = self.sink.as_ref()?;
        match sink.export(rows) {
            Ok(path) => {
                reporter.on_log(LogEntry::info(
                    None,
                    format!("exported {} rows to {}", rows.len(), path.display()),
                ));
                Some(path)
            }
            Err(e) => {
                reporter.on_log(LogEntry::error(None, format!("export failed: {}", e)));
                None
            }
        }
    }
}

/// Apply a run state change and trace it
fn change_state(run: &mut BatchRun, state: RunState) {
    let transition = run.transition_to(state);
    debug!(
        run_id = %transition.run_id,
        from = ?transition.old_state,
        to = ?transition.new_state,
        at = %transition.transitioned_at,
        "Run state changed"
    );
}
