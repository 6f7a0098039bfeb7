//! Structured error types for taskleak
//!
//! Using thiserror for automatic Display implementation and error chaining.

use taskleak_common::SnapshotError;
use thiserror::Error;

use crate::export::LeakReport;

#[derive(Error, Debug)]
pub enum LeakError {
    /// Unexpected tasks were still alive after the last retry.
    #[error("found unexpected tasks:\n{0}")]
    Leaked(LeakReport),

    #[error("cleanup can only be passed to verify_none or verify_main")]
    CleanupNotAllowed,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl LeakError {
    /// The leak report, if this error is a leak.
    pub fn report(&self) -> Option<&LeakReport> {
        match self {
            LeakError::Leaked(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
