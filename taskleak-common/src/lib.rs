//! # Shared Data Structures (Snapshot Provider ↔ Detector)
//!
//! Defines the records a snapshot provider hands to the leak detector and the
//! trait a provider implements. Nothing here knows how tasks are enumerated
//! or how leaks are judged; providers and the detector only agree on these
//! types.
//!
//! ## Key Types
//!
//! - [`TaskRecord`] - One live task as seen at snapshot time
//! - [`Frame`] - One entry of a task's call chain
//! - [`TaskSource`] - "List all current tasks", implemented by providers
//! - [`SnapshotError`] - The provider could not enumerate tasks at all

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

/// Task identifier
///
/// Stable only within a single process lifetime. Providers choose the
/// numbering (a kernel TID, a registry counter, ...); the detector only
/// compares identifiers for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}", self.0)
    }
}

// ============================================================================
// Task Records
// ============================================================================

/// One entry of a task's call chain.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// Fully qualified function name (e.g., `myapp::worker::run`)
    pub function: String,

    /// Source location or other provider-specific detail, if known
    pub location: Option<String>,
}

impl Frame {
    /// Frame with a function name and no location.
    pub fn new(function: impl Into<String>) -> Self {
        Self { function: function.into(), location: None }
    }

    /// Frame with a function name and a location.
    pub fn at(function: impl Into<String>, location: impl Into<String>) -> Self {
        Self { function: function.into(), location: Some(location.into()) }
    }

    /// Raw text of the frame as it appears in a dump: `function at location`.
    #[must_use]
    pub fn raw(&self) -> String {
        match &self.location {
            Some(location) => format!("{} at {location}", self.function),
            None => self.function.clone(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw())
    }
}

/// A live task as observed by one snapshot.
///
/// Records are read-only once built. `top_function` is always the first
/// frame's function, or the empty string for a record without frames.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskRecord {
    id: TaskId,
    state: String,
    top_function: String,
    frames: Vec<Frame>,
}

impl TaskRecord {
    /// Build a record; the top function is taken from the first frame.
    pub fn new(id: TaskId, state: impl Into<String>, frames: Vec<Frame>) -> Self {
        let top_function = frames.first().map(|f| f.function.clone()).unwrap_or_default();
        Self { id, state: state.into(), top_function, frames }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// State descriptor, e.g. `running`, `chan receive`, `syscall`.
    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn top_function(&self) -> &str {
        &self.top_function
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Returns true if any frame's function equals `function` exactly.
    #[must_use]
    pub fn has_function(&self, function: &str) -> bool {
        self.frames.iter().any(|f| f.function == function)
    }

    /// Returns true if any frame's raw text contains `needle`.
    #[must_use]
    pub fn match_any_entry(&self, needle: &str) -> bool {
        self.frames.iter().any(|f| f.raw().contains(needle))
    }
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in state {}, with {} on top of the stack",
            self.id, self.state, self.top_function
        )
    }
}

// ============================================================================
// Provider Boundary
// ============================================================================

/// Enumeration failed; the environment cannot list its tasks.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("task enumeration unavailable: {0}")]
    Unavailable(String),
}

/// A provider of point-in-time task snapshots.
///
/// Implementations must be safe to call repeatedly while the rest of the
/// process keeps spawning and finishing tasks. Torn snapshots are fine; the
/// detector re-snapshots instead of trusting a single read.
pub trait TaskSource {
    /// List all tasks alive right now.
    ///
    /// # Errors
    /// Returns [`SnapshotError`] if tasks cannot be enumerated at all.
    fn snapshot(&self) -> Result<Vec<TaskRecord>, SnapshotError>;

    /// The task making this call, if the provider can tell.
    ///
    /// The detector never reports the task that runs it.
    fn current(&self) -> Option<TaskId> {
        None
    }
}

impl<S: TaskSource + ?Sized> TaskSource for &S {
    fn snapshot(&self) -> Result<Vec<TaskRecord>, SnapshotError> {
        (**self).snapshot()
    }

    fn current(&self) -> Option<TaskId> {
        (**self).current()
    }
}
