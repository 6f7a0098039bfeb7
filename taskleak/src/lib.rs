//! # taskleak - Leaked Task Detection for Test Suites
//!
//! taskleak checks, at the end of a test or a whole test binary, that no
//! thread or async task spawned during the run is still alive. Leaked tasks
//! pile up silently across a suite and hide missing shutdowns, lost wakeups
//! and deadlocks; taskleak turns them into a test failure with the leaked
//! tasks' frames.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Test / Test Binary                       │
//! │        find()  ·  verify_none()  ·  verify_main()               │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ options
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       taskleak (This Crate)                     │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │    Config    │──▶│ Filter Chain │◀──│   Default    │         │
//! │  │  (options)   │   │   (any of)   │   │ Classifiers  │         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │                            │                                    │
//! │                            ▼                                    │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Baseline   │   │    Retry /   │──▶│ Leak Report  │         │
//! │  │  (captured)  │   │   Backoff    │   │ (text/JSON)  │         │
//! │  └──────┬───────┘   └──────┬───────┘   └──────────────┘         │
//! └─────────┼──────────────────┼────────────────────────────────────┘
//!           │ snapshot         │ snapshot per attempt
//!           ▼                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │               TaskSource (taskleak-common trait)                │
//! │       Tracker (tracked threads/tasks) · ProcThreads (/proc)     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`config`]: [`Config`], folded from [`LeakOption`] values
//! - [`options`]: option constructors (filters and settings)
//! - [`filter`]: named predicates and their OR-chain
//! - [`classification`]: default benign-task rules and the runtime names
//!   they depend on
//! - [`retry`]: bounded retry with exponential backoff
//! - [`baseline`]: [`ignore_current`], exempting tasks alive at capture time
//! - [`verify`]: detection entry points
//! - [`snapshot`]: task providers ([`Tracker`], [`ProcThreads`])
//! - [`export`]: [`LeakReport`] text and JSON output
//! - [`domain`]: error types and re-exported record types
//!
//! ## Typical Usage
//!
//! ```rust,ignore
//! use taskleak::{find, ignore_current, options, Tracker};
//!
//! let tracker = Tracker::new();
//! let baseline = ignore_current(&tracker)?;
//!
//! start_server(&tracker);
//! stop_server();
//!
//! find(&tracker, [baseline, options::ignore_top_function("app::metrics::flush")])?;
//! ```
//!
//! ## Key Concepts
//!
//! - **Task**: a thread or async task, identified within one process lifetime
//! - **Snapshot**: every live task with its state and frames at one instant
//! - **Filter**: a rule marking a task as benign; a task is reported only if
//!   no filter matches it
//! - **Baseline**: the ids alive when [`ignore_current`] ran

pub mod baseline;
pub mod classification;
pub mod config;
pub mod domain;
pub mod export;
pub mod filter;
pub mod options;
pub mod retry;
pub mod snapshot;
pub mod verify;

pub use baseline::ignore_current;
pub use config::Config;
pub use domain::{Frame, LeakError, SnapshotError, TaskId, TaskRecord, TaskSource};
pub use export::LeakReport;
pub use filter::{Filter, FilterChain};
pub use options::LeakOption;
pub use snapshot::{tracker, ProcThreads, Tracker};
pub use verify::{find, find_with, verify_main, verify_none};
