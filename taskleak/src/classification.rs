//! Default classification of benign tasks.
//!
//! Some tasks outlive every test for reasons the user does not control: the
//! test harness waiting for results, native helpers parked in a system call,
//! signal delivery loops and trace writers. These classifiers recognise them
//! so the detector does not report them as leaks.
//!
//! # Matching Strategy
//!
//! A false positive here hides a real leak, so each classifier matches the
//! narrowest signature it can:
//!
//! 1. **Test harness** - exact libtest top function AND a channel-receive
//!    state, or a main thread (runtime entry as bottom frame) AND a blocked
//!    state
//! 2. **Syscall** - task-exit bottom frame AND a syscall state
//! 3. **Std lib** - exact signal-delivery top function, or the registration
//!    helper in the stack
//! 4. **Trace** - exact trace-writer top function
//!
//! No classifier matches on a top function that an ordinary user task could
//! also have without a state condition, except for names that only exist in
//! the signal and trace crates.

pub mod names;

use taskleak_common::TaskRecord;

use crate::filter::Filter;
use names::{
    MAIN_ENTRY, MAIN_HARNESS_STATES, SIGNAL_REGISTRATION_HELPER, SIGNAL_TOP_FUNCTIONS,
    STATE_CHAN_RECEIVE, STATE_SYSCALL, TASK_EXIT, TEST_HARNESS_TOP_FUNCTIONS, TRACE_TOP_FUNCTIONS,
};

/// Why a task was considered benign by the default classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BenignKind {
    /// Test-driver coordination task blocked on a channel
    TestHarness,
    /// Background task blocked in a system call
    Syscall,
    /// Signal handling started by the standard signal crates
    StdLib,
    /// The process's own trace writer
    Trace,
}

impl BenignKind {
    /// All kinds, in the order the default filter chain checks them.
    pub const ALL: [BenignKind; 4] =
        [BenignKind::TestHarness, BenignKind::Syscall, BenignKind::StdLib, BenignKind::Trace];

    /// Returns true if this classifier recognises `task`.
    #[must_use]
    pub fn matches(self, task: &TaskRecord) -> bool {
        match self {
            BenignKind::TestHarness => is_test_harness_task(task),
            BenignKind::Syscall => is_syscall_task(task),
            BenignKind::StdLib => is_std_lib_task(task),
            BenignKind::Trace => is_trace_task(task),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BenignKind::TestHarness => "test-harness",
            BenignKind::Syscall => "syscall",
            BenignKind::StdLib => "std-lib",
            BenignKind::Trace => "trace",
        }
    }

    /// This classifier as a filter.
    pub fn filter(self) -> Filter {
        Filter::new(self.label(), move |task: &TaskRecord| self.matches(task))
    }
}

/// Classify a task with the default rules.
///
/// Returns the first matching kind, or `None` if the task looks like an
/// ordinary user task.
#[must_use]
pub fn classify_task(task: &TaskRecord) -> Option<BenignKind> {
    BenignKind::ALL.into_iter().find(|kind| kind.matches(task))
}

/// The four default classifiers as filters.
pub fn default_filters() -> Vec<Filter> {
    BenignKind::ALL.into_iter().map(BenignKind::filter).collect()
}

// =============================================================================
// CLASSIFIERS
// =============================================================================

/// libtest keeps coordination tasks blocked on a channel while tests run.
///
/// OS-thread providers cannot see libtest's frames; there the harness is the
/// main thread, recognised by its runtime entry frame and a blocked state.
pub fn is_test_harness_task(task: &TaskRecord) -> bool {
    let by_name = TEST_HARNESS_TOP_FUNCTIONS.iter().any(|name| *name == task.top_function())
        && task.state().starts_with(STATE_CHAN_RECEIVE);
    by_name || is_blocked_main_thread(task)
}

fn is_blocked_main_thread(task: &TaskRecord) -> bool {
    task.frames().last().is_some_and(|frame| frame.function == MAIN_ENTRY)
        && MAIN_HARNESS_STATES.iter().any(|state| task.state().starts_with(state))
}

/// Native interop helpers park in a system call for the life of the process.
pub fn is_syscall_task(task: &TaskRecord) -> bool {
    task.has_function(TASK_EXIT) && task.state().starts_with(STATE_SYSCALL)
}

/// Installing a signal handler starts a delivery task outside user control.
pub fn is_std_lib_task(task: &TaskRecord) -> bool {
    SIGNAL_TOP_FUNCTIONS.iter().any(|name| *name == task.top_function())
        || task.has_function(SIGNAL_REGISTRATION_HELPER)
}

/// The non-blocking trace writer lives as long as its guard.
pub fn is_trace_task(task: &TaskRecord) -> bool {
    TRACE_TOP_FUNCTIONS.iter().any(|name| *name == task.top_function())
}
