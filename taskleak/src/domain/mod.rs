//! Domain model for taskleak
//!
//! Task records and identifiers live in `taskleak-common` so snapshot
//! providers can depend on them alone; this module re-exports them next to
//! the detector's own error types.

pub mod errors;

// Re-export common types for convenience
pub use taskleak_common::{Frame, SnapshotError, TaskId, TaskRecord, TaskSource};

pub use errors::{ExportError, LeakError};
