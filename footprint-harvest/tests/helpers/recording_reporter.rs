//! Reporter that keeps everything it is told

use footprint_common::events::{LogEntry, LogLevel};
use footprint_harvest::models::TargetOutcome;
use footprint_harvest::reporter::BatchReporter;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct RecordingReporter {
    entries: Mutex<Vec<LogEntry>>,
    statuses: Mutex<Vec<String>>,
    progress: Mutex<Vec<(usize, usize)>>,
    finished: Mutex<Vec<TargetOutcome>>,
    /// Cancelled once this many targets have finished
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter that fires `token` after `targets` targets finished
    pub fn cancelling_after(targets: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((targets, token)),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries().into_iter().filter(|e| e.level == level).collect()
    }

    pub fn entries_for(&self, target_id: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.target_id.as_deref() == Some(target_id))
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<(usize, usize)> {
        self.progress.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<TargetOutcome> {
        self.finished.lock().unwrap().clone()
    }
}

impl BatchReporter for RecordingReporter {
    fn on_progress(&self, done: usize, total: usize) {
        self.progress.lock().unwrap().push((done, total));
    }

    fn on_log(&self, entry: LogEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    fn on_status(&self, text: &str) {
        self.statuses.lock().unwrap().push(text.to_string());
    }

    fn on_target_finished(&self, outcome: &TargetOutcome) {
        let count = {
            let mut finished = self.finished.lock().unwrap();
            finished.push(outcome.clone());
            finished.len()
        };
        if let Some((after, token)) = &self.cancel_after {
            if count >= *after {
                token.cancel();
            }
        }
    }
}
