// src/progress/mod.rs

//! Progress-event vocabulary and the diagnostics boundary.
//!
//! External programs report progress on stdout; a [`ProgressSource`]
//! implementation turns that stream into [`ProgressEvent`]s which the
//! supervisor maps onto the future's normalized progress scale.

pub mod source;

pub use source::{LineProgressSource, ProgressSource};

use std::sync::Arc;

use tracing::warn;

/// Normalized progress scale used by every task future.
///
/// 0 is reserved for "not yet started" and [`PROGRESS_DONE`] for the terminal
/// snapshot; fractional progress from the child maps into `1..=999`.
pub const PROGRESS_DONE: u32 = 1000;

/// Largest progress value a running (not yet finished) task may publish.
pub const PROGRESS_RUNNING_MAX: u32 = PROGRESS_DONE - 1;

/// One observed progress marker from a child process's output.
///
/// Transient: events are consumed by the supervisor as they arrive and are
/// never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A named processing step began.
    Started { name: String, comment: String },
    /// Fractional progress of the current step, in `[0, 1]`.
    Progress { fraction: f32 },
    /// A named processing step completed.
    Finished { name: String },
    /// The source failed to parse a progress marker. Non-fatal; routed to the
    /// diagnostics sink only.
    Error { message: String },
}

/// One-way sink for non-fatal per-event diagnostics, keyed by the external
/// program's location. No return value and no effect on future state.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, location: &str, message: &str);
}

/// Default sink: forward to `tracing` at warn level.
pub struct LogDiagnostics;

impl DiagnosticsSink for LogDiagnostics {
    fn report(&self, location: &str, message: &str) {
        warn!(module = %location, "{message}");
    }
}

/// Shared handle type used throughout the task machinery.
pub type SharedDiagnostics = Arc<dyn DiagnosticsSink>;
