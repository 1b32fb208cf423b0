//! Event types for batch runs
//!
//! Provides the BatchEvent enum, the append-only log entry model, and the
//! EventBus used to fan events out to any number of observers (console,
//! JSON-lines event log, tests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One entry of a run's append-only log stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Target the entry refers to, None for run-level entries
    pub target_id: Option<String>,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, target_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            target_id: target_id.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn info(target_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, target_id, message)
    }

    pub fn warn(target_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, target_id, message)
    }

    pub fn error(target_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, target_id, message)
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let marker = match self.level {
            LogLevel::Info => "•",
            LogLevel::Warn => "⚠",
            LogLevel::Error => "✗",
        };
        match &self.target_id {
            Some(id) => write!(f, "{} {}: {}", marker, id, self.message),
            None => write!(f, "{} {}", marker, self.message),
        }
    }
}

/// Batch run events
///
/// Serialized with an internal `type` tag so a JSON-lines event log can be
/// replayed or filtered by event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchEvent {
    /// Run accepted, targets counted
    RunStarted {
        run_id: Uuid,
        total_targets: usize,
        timestamp: DateTime<Utc>,
    },

    /// A target entered the pipeline
    TargetStarted {
        run_id: Uuid,
        index: usize,
        total: usize,
        target_id: String,
    },

    /// Human-readable status line changed
    Status { run_id: Uuid, text: String },

    /// Log stream entry
    Log { run_id: Uuid, entry: LogEntry },

    /// Targets processed so far
    Progress {
        run_id: Uuid,
        done: usize,
        total: usize,
        percentage: f64,
    },

    /// Target produced polygons
    TargetCompleted {
        run_id: Uuid,
        target_id: String,
        polygons: usize,
        duration_ms: u64,
    },

    /// Target was skipped after a failure
    TargetFailed {
        run_id: Uuid,
        target_id: String,
        stage: String,
        error: String,
    },

    /// Run finished (normally or after an abort request)
    RunCompleted {
        run_id: Uuid,
        rows: usize,
        failures: usize,
        cancelled: bool,
        export_path: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for BatchEvent
///
/// Events emitted while nobody is subscribed are dropped. Slow subscribers
/// lose the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BatchEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: BatchEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("EventBus: no subscribers");
        }
    }
}
