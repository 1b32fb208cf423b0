//! Run observers
//!
//! The orchestrator reports through [`BatchReporter`] only: a status line,
//! an append-only log stream and a progress fraction, plus lifecycle hooks
//! observers may ignore. Reporting never fails a run.

use crate::models::{BatchReport, BatchRun, TargetOutcome, TargetStatus};
use footprint_common::events::{BatchEvent, EventBus, LogEntry, LogLevel};
use std::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

pub trait BatchReporter: Send + Sync {
    fn on_progress(&self, done: usize, total: usize);

    fn on_log(&self, entry: LogEntry);

    fn on_status(&self, text: &str);

    fn on_run_started(&self, _run: &BatchRun) {}

    fn on_target_started(&self, _index: usize, _total: usize, _target_id: &str) {}

    fn on_target_finished(&self, _outcome: &TargetOutcome) {}

    fn on_run_finished(&self, _report: &BatchReport) {}
}

/// Reporter that drops everything
pub struct NullReporter;

impl BatchReporter for NullReporter {
    fn on_progress(&self, _done: usize, _total: usize) {}
    fn on_log(&self, _entry: LogEntry) {}
    fn on_status(&self, _text: &str) {}
}

/// Forwards every report onto the event bus and mirrors it to tracing
pub struct EventReporter {
    bus: EventBus,
    run_id: Mutex<Uuid>,
}

impl EventReporter {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            run_id: Mutex::new(Uuid::nil()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn run_id(&self) -> Uuid {
        match self.run_id.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl BatchReporter for EventReporter {
    fn on_progress(&self, done: usize, total: usize) {
        let percentage = if total > 0 {
            done as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        self.bus.emit_lossy(BatchEvent::Progress {
            run_id: self.run_id(),
            done,
            total,
            percentage,
        });
    }

    fn on_log(&self, entry: LogEntry) {
        let target_id = entry.target_id.as_deref().unwrap_or("-");
        match entry.level {
            LogLevel::Info => info!(target_id, "{}", entry.message),
            LogLevel::Warn => warn!(target_id, "{}", entry.message),
            LogLevel::Error => error!(target_id, "{}", entry.message),
        }
        self.bus.emit_lossy(BatchEvent::Log {
            run_id: self.run_id(),
            entry,
        });
    }

    fn on_status(&self, text: &str) {
        info!(status = text, "Status");
        self.bus.emit_lossy(BatchEvent::Status {
            run_id: self.run_id(),
            text: text.to_string(),
        });
    }

    fn on_run_started(&self, run: &BatchRun) {
        match self.run_id.lock() {
            Ok(mut guard) => *guard = run.run_id,
            Err(poisoned) => *poisoned.into_inner() = run.run_id,
        }
        self.bus.emit_lossy(BatchEvent::RunStarted {
            run_id: run.run_id,
            total_targets: run.progress.total,
            timestamp: run.started_at,
        });
    }

    fn on_target_started(&self, index: usize, total: usize, target_id: &str) {
        self.bus.emit_lossy(BatchEvent::TargetStarted {
            run_id: self.run_id(),
            index,
            total,
            target_id: target_id.to_string(),
        });
    }

    fn on_target_finished(&self, outcome: &TargetOutcome) {
        let event = match &outcome.status {
            TargetStatus::Succeeded { polygons, .. } => BatchEvent::TargetCompleted {
                run_id: self.run_id(),
                target_id: outcome.target_id.clone(),
                polygons: *polygons,
                duration_ms: outcome.duration_ms,
            },
            TargetStatus::Failed { stage, error } => BatchEvent::TargetFailed {
                run_id: self.run_id(),
                target_id: outcome.target_id.clone(),
                stage: stage.to_string(),
                error: error.clone(),
            },
        };
        self.bus.emit_lossy(event);
    }

    fn on_run_finished(&self, report: &BatchReport) {
        self.bus.emit_lossy(BatchEvent::RunCompleted {
            run_id: report.run.run_id,
            rows: report.rows.len(),
            failures: report.failed(),
            cancelled: report.run.state == crate::models::RunState::Cancelled,
            export_path: report.export_path.as_ref().map(|p| p.display().to_string()),
            timestamp: report.run.ended_at.unwrap_or_else(chrono::Utc::now),
        });
    }
}
