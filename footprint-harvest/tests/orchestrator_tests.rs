//! Batch orchestration tests
//!
//! Ordering, failure isolation, cancellation and export, with scripted
//! oracles and a solid-color surface.

mod helpers;

use footprint_common::config::HarvestSettings;
use footprint_common::events::LogLevel;
use footprint_harvest::error::OracleError;
use footprint_harvest::models::{PipelineStage, RunState, Target, TargetStatus};
use footprint_harvest::orchestrator::{BatchConfig, BatchOrchestrator};
use footprint_harvest::sink::CsvResultSink;
use helpers::{fast_policy, square, FakeSurface, RecordingReporter, ScriptedRefinement, ScriptedSegmentation};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn targets() -> Vec<Target> {
    vec![
        Target::new("A", 45.0, 9.0),
        Target::new("B", 46.0, 9.0),
        Target::new("C", 47.0, 9.0),
    ]
}

fn origin_of(id: &str) -> (f64, f64) {
    match id {
        "A" => (45.0, 9.0),
        "B" => (46.0, 9.0),
        _ => (47.0, 9.0),
    }
}

fn batch_config() -> BatchConfig {
    let mut config = BatchConfig::from_settings(&HarvestSettings::default());
    config.harmonization.iteration_delay = Duration::from_millis(1);
    config
}

/// Segmentation that fails for the target harmonized near latitude 46
fn failing_for_b() -> ScriptedSegmentation {
    ScriptedSegmentation::new(|request| {
        if (request.lat - 46.0).abs() < 0.5 {
            Err(OracleError::protocol("model crashed"))
        } else {
            Ok(vec![square("building", 50.0)])
        }
    })
}

#[tokio::test]
async fn failing_target_is_skipped_and_logged_once() {
    helpers::init_test_logging();

    // Given: three targets, segmentation fails for B
    let refinement = Arc::new(ScriptedRefinement::shifting(0.0, 0.0, origin_of));
    let segmentation = Arc::new(failing_for_b());
    let mut orchestrator = BatchOrchestrator::new(
        FakeSurface::gray(),
        refinement,
        segmentation,
        batch_config(),
        fast_policy(),
    );
    let reporter = RecordingReporter::new();

    // When: running the batch
    let report = orchestrator
        .run(&targets(), &reporter, &CancellationToken::new())
        .await;

    // Then: rows only for A and C, in order
    let ids: Vec<&str> = report.rows.iter().map(|r| r.target_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "C"]);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.run.state, RunState::Completed);

    // Exactly one error entry, naming B
    let errors = reporter.entries_at(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].target_id.as_deref(), Some("B"));
    assert!(errors[0].message.contains("B"));
    assert!(errors[0].message.contains("segmentation"));

    match &report.outcomes[1].status {
        TargetStatus::Failed { stage, .. } => assert_eq!(*stage, PipelineStage::Segmentation),
        other => panic!("expected B to fail, got {:?}", other),
    }

    // Progress after each target
    assert_eq!(reporter.progress(), vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(report.run.progress.done, 3);

    let last_status = reporter.statuses().last().cloned().unwrap();
    assert_eq!(last_status, "Done: 2 polygons from 2/3 targets (1 failed)");
}

#[tokio::test]
async fn rows_use_harmonized_position() {
    let refinement = Arc::new(ScriptedRefinement::shifting(0.0001, 0.0002, origin_of));
    let segmentation = Arc::new(ScriptedSegmentation::fixed(vec![
        square("house", 40.0),
        square("shed", 10.0),
    ]));
    let mut orchestrator = BatchOrchestrator::new(
        FakeSurface::gray(),
        refinement,
        segmentation,
        batch_config(),
        fast_policy(),
    );

    let report = orchestrator
        .run(&targets()[..1], &RecordingReporter::new(), &CancellationToken::new())
        .await;

    assert_eq!(report.rows.len(), 2);
    for row in &report.rows {
        assert_eq!(row.target_id, "A");
        assert!((row.final_lat - 45.0001).abs() < 1e-12);
        assert!((row.final_lng - 9.0002).abs() < 1e-12);
    }
    // Larger square, larger area
    assert_eq!(report.rows[0].polygon_label, "house");
    assert!(report.rows[0].area_sq_meters > report.rows[1].area_sq_meters);
    assert!(report.rows[1].area_sq_meters > 0.0);
}

#[tokio::test]
async fn harmonization_failure_is_attributed() {
    let refinement = Arc::new(ScriptedRefinement::new(|request, _| {
        if request.id == "A" {
            Err(OracleError::Transport("connection refused".to_string()))
        } else {
            Ok(helpers::converged_at(47.0, 9.0))
        }
    }));
    let segmentation = Arc::new(ScriptedSegmentation::fixed(vec![square("b", 20.0)]));
    let segmentation_calls = Arc::clone(&segmentation);
    let mut orchestrator = BatchOrchestrator::new(
        FakeSurface::gray(),
        refinement,
        segmentation,
        batch_config(),
        fast_policy(),
    );
    let reporter = RecordingReporter::new();

    let report = orchestrator
        .run(
            &[Target::new("A", 45.0, 9.0), Target::new("C", 47.0, 9.0)],
            &reporter,
            &CancellationToken::new(),
        )
        .await;

    match &report.outcomes[0].status {
        TargetStatus::Failed { stage, error } => {
            assert_eq!(*stage, PipelineStage::Harmonization);
            assert!(error.contains("connection refused"));
        }
        other => panic!("expected A to fail, got {:?}", other),
    }
    assert!(report.outcomes[1].is_success());
    // A never reached segmentation
    assert_eq!(segmentation_calls.requests().len(), 1);
    assert_eq!(reporter.entries_for("A").iter().filter(|e| e.level == LogLevel::Error).count(), 1);
}

#[tokio::test]
async fn final_capture_uses_final_zoom() {
    let refinement = Arc::new(ScriptedRefinement::shifting(0.0, 0.0, origin_of));
    let segmentation = Arc::new(ScriptedSegmentation::fixed(vec![square("a", 20.0)]));
    let segmentation_calls = Arc::clone(&segmentation);
    let mut config = batch_config();
    config.final_zoom = 19.5;
    let mut orchestrator =
        BatchOrchestrator::new(FakeSurface::gray(), refinement, segmentation, config, fast_policy());

    orchestrator
        .run(&targets()[..1], &RecordingReporter::new(), &CancellationToken::new())
        .await;

    let zooms: Vec<f64> = orchestrator.surface().recenters.iter().map(|c| c.zoom).collect();
    assert_eq!(zooms, vec![18.8, 19.5]);
    assert_eq!(segmentation_calls.requests()[0].zoom, 19.5);
}

#[tokio::test]
async fn cancelled_before_start_processes_nothing() {
    let refinement = Arc::new(ScriptedRefinement::shifting(0.0, 0.0, origin_of));
    let refinement_calls = Arc::clone(&refinement);
    let mut orchestrator = BatchOrchestrator::new(
        FakeSurface::gray(),
        refinement,
        Arc::new(ScriptedSegmentation::fixed(Vec::new())),
        batch_config(),
        fast_policy(),
    );
    let reporter = RecordingReporter::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator.run(&targets(), &reporter, &cancel).await;

    assert_eq!(report.run.state, RunState::Cancelled);
    assert!(report.outcomes.is_empty());
    assert!(report.rows.is_empty());
    assert_eq!(refinement_calls.call_count(), 0);
    assert_eq!(reporter.entries_at(LogLevel::Warn).len(), 1);
    assert_eq!(
        reporter.statuses().last().cloned().unwrap(),
        "Cancelled: 0 polygons from 0/3 targets (0 failed)"
    );
}

#[tokio::test]
async fn cancellation_takes_effect_at_target_boundary() {
    let cancel = CancellationToken::new();
    let reporter = RecordingReporter::cancelling_after(1, cancel.clone());
    let mut orchestrator = BatchOrchestrator::new(
        FakeSurface::gray(),
        Arc::new(ScriptedRefinement::shifting(0.0, 0.0, origin_of)),
        Arc::new(ScriptedSegmentation::fixed(vec![square("a", 20.0)])),
        batch_config(),
        fast_policy(),
    );

    let report = orchestrator.run(&targets(), &reporter, &cancel).await;

    // The first target finished; nothing after it started
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcomes[0].is_success());
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.run.state, RunState::Cancelled);
    assert_eq!(reporter.progress(), vec![(1, 3)]);
}

#[tokio::test]
async fn export_is_written_even_when_all_targets_fail() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = BatchOrchestrator::new(
        FakeSurface::black(),
        Arc::new(ScriptedRefinement::shifting(0.0, 0.0, origin_of)),
        Arc::new(ScriptedSegmentation::fixed(Vec::new())),
        batch_config(),
        fast_policy(),
    )
    .with_sink(Box::new(CsvResultSink::new(dir.path(), "footprints")));
    let reporter = RecordingReporter::new();

    let report = orchestrator
        .run(&targets(), &reporter, &CancellationToken::new())
        .await;

    assert_eq!(report.failed(), 3);
    assert_eq!(reporter.entries_at(LogLevel::Error).len(), 3);
    let path = report.export_path.expect("export path");
    let content = std::fs::read_to_string(path).unwrap();
    assert_eq!(
        content.trim_end(),
        "target_id,polygon_label,area_sq_meters,final_lat,final_lng"
    );
}

#[tokio::test]
async fn export_contains_one_line_per_polygon() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = BatchOrchestrator::new(
        FakeSurface::gray(),
        Arc::new(ScriptedRefinement::shifting(0.0, 0.0, origin_of)),
        Arc::new(failing_for_b()),
        batch_config(),
        fast_policy(),
    )
    .with_sink(Box::new(CsvResultSink::new(dir.path().join("out"), "run")));

    let report = orchestrator
        .run(&targets(), &RecordingReporter::new(), &CancellationToken::new())
        .await;

    let path = report.export_path.expect("export path");
    assert!(path.starts_with(dir.path().join("out")));

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let ids: Vec<String> = reader
        .records()
        .map(|r| r.unwrap().get(0).unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["A", "C"]);
}

#[tokio::test]
async fn failed_export_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    // A file where the output directory should be
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"").unwrap();

    let mut orchestrator = BatchOrchestrator::new(
        FakeSurface::gray(),
        Arc::new(ScriptedRefinement::shifting(0.0, 0.0, origin_of)),
        Arc::new(ScriptedSegmentation::fixed(vec![square("a", 20.0)])),
        batch_config(),
        fast_policy(),
    )
    .with_sink(Box::new(CsvResultSink::new(&blocker, "run")));
    let reporter = RecordingReporter::new();

    let report = orchestrator
        .run(&targets()[..1], &reporter, &CancellationToken::new())
        .await;

    assert!(report.export_path.is_none());
    assert_eq!(report.rows.len(), 1);
    let errors = reporter.entries_at(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("export failed"));
}
