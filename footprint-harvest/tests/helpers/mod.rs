//! Test Helper Utilities
//!
//! Shared fakes and local servers for footprint-harvest integration tests

#![allow(dead_code)]

pub mod fake_oracles;
pub mod fake_surface;
pub mod mock_servers;
pub mod recording_reporter;

// Re-export commonly used items
pub use fake_oracles::{converged_at, square, ScriptedRefinement, ScriptedSegmentation};
pub use fake_surface::FakeSurface;
pub use mock_servers::{closed_port, serve, solid_png};
pub use recording_reporter::RecordingReporter;

use footprint_harvest::capture::{AcquirePolicy, SettleBudget};
use std::time::Duration;

/// Acquire policy with short settle budgets so tests stay fast
pub fn fast_policy() -> AcquirePolicy {
    let budget = SettleBudget {
        min_ready_tiles: 6,
        max_wait: Duration::from_millis(50),
    };
    AcquirePolicy {
        initial_settle: budget,
        retry_settle: SettleBudget {
            max_wait: Duration::from_millis(20),
            ..budget
        },
        max_attempts: 3,
        black_luminance_threshold: 6.0,
    }
}

/// Initialize test logging (may already be initialized by another test)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "footprint_harvest=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
