//! Snapshot providers
//!
//! The detector only needs something that lists live tasks; these are the
//! two providers shipped with the crate:
//! - Tracker: registry of threads and Tokio tasks spawned through it
//! - Proc threads: every OS thread of the process, read from /proc

pub mod proc_threads;
pub mod tracker;

// Re-export common types
pub use proc_threads::ProcThreads;
pub use tracker::{StateGuard, Tracker};
