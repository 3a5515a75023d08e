// src/errors.rs

//! Crate-wide error aliases plus the structured terminal error a failed run
//! attaches to its [`crate::task::TaskFuture`].

use serde::Serialize;

pub use anyhow::{Error, Result};

/// Terminal error payload for one external-program run.
///
/// Carried by the future's terminal snapshot when the child failed to start,
/// reported an OS-level error, or exited non-zero. `exit_code` is the actual
/// exit code when one exists and `-1` when the process never produced one
/// (spawn failure, killed by signal).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("'{location}' failed with exit code {exit_code}: {message}")]
pub struct RunError {
    /// Path/identifier of the external program, for diagnostics only.
    pub location: String,
    pub exit_code: i32,
    /// Process error description or captured standard-error text.
    pub message: String,
}

impl RunError {
    pub fn new(location: impl Into<String>, exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            exit_code,
            message: message.into(),
        }
    }
}
