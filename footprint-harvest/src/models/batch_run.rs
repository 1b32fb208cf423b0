//! Batch run state machine
//!
//! A run progresses PREPARING → PROCESSING → COMPLETED, or ends in
//! CANCELLED when the abort token fires between targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Batch run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    /// Run created, no target started yet
    Preparing,
    /// Targets are being processed in list order
    Processing,
    /// Every target was attempted
    Completed,
    /// Abort requested; remaining targets skipped
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled)
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// One batch run (in-memory only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub run_id: Uuid,
    pub state: RunState,
    pub progress: RunProgress,
    pub started_at: DateTime<Utc>,
    /// Set when the run reaches a terminal state
    pub ended_at: Option<DateTime<Utc>>,
}

/// Progress through the target list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    /// Targets finished (successfully or not)
    pub done: usize,
    pub total: usize,
    /// 0.0 - 100.0
    pub percentage: f64,
    pub current_target: Option<String>,
    pub elapsed_seconds: u64,
    /// None until at least one target finished
    pub estimated_remaining_seconds: Option<u64>,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            done: 0,
            total: 0,
            percentage: 0.0,
            current_target: None,
            elapsed_seconds: 0,
            estimated_remaining_seconds: None,
        }
    }
}

impl BatchRun {
    pub fn new(total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Preparing,
            progress: RunProgress {
                total,
                ..RunProgress::default()
            },
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to `new_state`, stamping the end time on terminal states
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    pub fn update_progress(&mut self, done: usize, current_target: Option<String>) {
        let total = self.progress.total;
        self.progress.done = done;
        self.progress.percentage = if total > 0 {
            (done as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        self.progress.current_target = current_target;

        let elapsed = (Utc::now() - self.started_at).num_seconds().max(0) as u64;
        self.progress.elapsed_seconds = elapsed;

        if done > 0 && total > done {
            let rate = elapsed as f64 / done as f64;
            self.progress.estimated_remaining_seconds = Some(((total - done) as f64 * rate) as u64);
        } else {
            self.progress.estimated_remaining_seconds = None;
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
