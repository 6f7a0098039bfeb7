//! Fully-qualified names the default classifiers look for.
//!
//! These are an environment contract, not detector logic: they name
//! functions, thread names and states that the Rust toolchain, libtest and a
//! few well-known crates produce. Update them here when those names move.
//!
//! Thread-based providers report the kernel thread name as the top function,
//! and the kernel truncates thread names to 15 bytes. Tables that must match
//! OS threads therefore carry the truncated spelling as well.

// =============================================================================
// STATES
// =============================================================================

/// State prefix of a task parked on a channel or queue receive.
pub const STATE_CHAN_RECEIVE: &str = "chan receive";

/// State prefix of a task blocked inside a system call.
pub const STATE_SYSCALL: &str = "syscall";

/// State of a task currently executing.
pub const STATE_RUNNING: &str = "running";

/// State of an async task spawned but not yet polled.
pub const STATE_RUNNABLE: &str = "runnable";

/// State of an async task between polls.
pub const STATE_IDLE: &str = "idle";

/// State of a task in a timed sleep.
pub const STATE_SLEEP: &str = "sleep";

/// State of a task waiting on readiness (poll/epoll/select).
pub const STATE_IO_WAIT: &str = "IO wait";

/// Blocked, but the provider cannot tell on what.
pub const STATE_WAITING: &str = "waiting";

pub const STATE_STOPPED: &str = "stopped";

pub const STATE_DEAD: &str = "dead";

// =============================================================================
// FRAMES
// =============================================================================

/// Bottom frame of every task's call chain.
///
/// Every std thread on unix starts here, and every provider in this crate
/// closes a record's frames with it.
pub const TASK_EXIT: &str = "std::sys::pal::unix::thread::Thread::new::thread_start";

/// Bottom frame of a process's main thread.
pub const MAIN_ENTRY: &str = "std::rt::lang_start_internal";

/// States of a main thread idling in libtest while tests run.
///
/// OS-thread providers only see the wait, so a main thread blocked on the
/// test-completion channel reads as either of these depending on whether the
/// kernel exposes its wait channel.
pub const MAIN_HARNESS_STATES: &[&str] = &[STATE_CHAN_RECEIVE, STATE_WAITING];

/// libtest entry points whose tasks sit on a channel while tests run.
///
/// `run_tests_console` and `run_tests` drive the suite from the main thread
/// and wait for test completions; `run_test_in_process` hosts each test.
pub const TEST_HARNESS_TOP_FUNCTIONS: &[&str] = &[
    "test::test_main",
    "test::console::run_tests_console",
    "test::run_tests",
    "test::run_test",
    "test::run_test_in_process",
];

/// Signal delivery loops started on behalf of the user.
pub const SIGNAL_TOP_FUNCTIONS: &[&str] = &[
    "ctrlc::platform::unix::block_ctrl_c",
    // Thread name used by ctrlc's delivery thread
    "ctrl-c",
];

/// Present in the stack of any task spawned by signal handler registration.
pub const SIGNAL_REGISTRATION_HELPER: &str = "ctrlc::set_handler_inner::{{closure}}";

/// Trace writer worker started by `tracing_appender::non_blocking`.
pub const TRACE_TOP_FUNCTIONS: &[&str] = &[
    "tracing_appender::worker::Worker::work",
    // "tracing-appender", truncated by the kernel
    "tracing-appende",
];
