//! Detection entry points.
//!
//! - [`find`] returns the leak as an error value
//! - [`verify_none`] panics on a leak, for use at the end of a test
//! - [`verify_main`] wraps a whole test suite and turns a leak into exit code 1

use std::thread;

use log::{debug, info, warn};
use taskleak_common::{TaskId, TaskRecord, TaskSource};

use crate::config::Config;
use crate::domain::LeakError;
use crate::export::LeakReport;
use crate::options::LeakOption;
use crate::retry::Outcome;

/// Look for unexpected tasks in `source`.
///
/// Builds a configuration with the default classifiers plus `options` and
/// retries with backoff until no unexpected task remains.
///
/// # Errors
/// - [`LeakError::Leaked`] if unexpected tasks remain after the last retry
/// - [`LeakError::CleanupNotAllowed`] if `options` contain a cleanup
/// - [`LeakError::Snapshot`] if `source` cannot enumerate its tasks
pub fn find<S: TaskSource + ?Sized>(
    source: &S,
    options: impl IntoIterator<Item = LeakOption>,
) -> Result<(), LeakError> {
    let config = Config::build(options);
    if config.cleanup().is_some() {
        return Err(LeakError::CleanupNotAllowed);
    }
    find_with(source, &config)
}

/// Look for unexpected tasks using an already built configuration.
///
/// Use this with [`Config::build_filters_only`]. The configuration's cleanup,
/// if any, is not run.
///
/// # Errors
/// Same as [`find`], except a cleanup is never rejected.
pub fn find_with<S: TaskSource + ?Sized>(source: &S, config: &Config) -> Result<(), LeakError> {
    let current = source.current();

    let outcome = config.backoff().run(
        |_| Ok::<_, LeakError>(unexpected_tasks(config, current, source.snapshot()?)),
        thread::sleep,
    )?;

    match outcome {
        Outcome::Succeeded { attempts } => {
            if attempts > 1 {
                info!("No unexpected tasks after {attempts} attempts");
            }
            Ok(())
        }
        Outcome::Exhausted { attempts, remaining } => {
            warn!("{} unexpected tasks still alive after {attempts} attempts", remaining.len());
            Err(LeakError::Leaked(LeakReport::new(remaining, attempts, config.pretty())))
        }
    }
}

/// Tasks in `tasks` that no filter expects, minus the caller itself.
fn unexpected_tasks(
    config: &Config,
    current: Option<TaskId>,
    tasks: Vec<TaskRecord>,
) -> Vec<TaskRecord> {
    tasks
        .into_iter()
        .filter(|task| Some(task.id()) != current)
        .filter(|task| match config.filters().first_match(task) {
            Some(label) => {
                debug!("{} expected ({label})", task.id());
                false
            }
            None => true,
        })
        .collect()
}

/// Assert that `source` has no unexpected tasks.
///
/// Runs the cleanup option, if any, with exit status 0 before reporting.
///
/// # Panics
/// Panics with the leak report if unexpected tasks remain, or if `source`
/// cannot enumerate its tasks.
#[track_caller]
pub fn verify_none<S>(source: &S, options: impl IntoIterator<Item = LeakOption>)
where
    S: TaskSource + ?Sized,
{
    let mut config = Config::build(options);
    let cleanup = config.take_cleanup();

    let result = find_with(source, &config);

    if let Some(cleanup) = cleanup {
        cleanup(0);
    }
    if let Err(err) = result {
        panic!("{err}");
    }
}

/// Run a test suite, then check for leaks if it passed.
///
/// `run` returns the suite's exit code. A leak after a passing run turns the
/// code into 1; a failing run is passed through without checking. The cleanup
/// option, if any, receives the final code. The caller exits with the
/// returned code:
///
/// ```rust,ignore
/// fn main() {
///     let code = taskleak::verify_main(taskleak::tracker::global(), run_all_tests, []);
///     std::process::exit(code);
/// }
/// ```
pub fn verify_main<S, F>(source: &S, run: F, options: impl IntoIterator<Item = LeakOption>) -> i32
where
    S: TaskSource + ?Sized,
    F: FnOnce() -> i32,
{
    let mut config = Config::build(options);
    let cleanup = config.take_cleanup();

    let mut code = run();
    if code == 0 {
        if let Err(err) = find_with(source, &config) {
            eprintln!("taskleak: errors on successful test run: {err}");
            code = 1;
        }
    }

    if let Some(cleanup) = cleanup {
        cleanup(code);
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::names::{STATE_CHAN_RECEIVE, TASK_EXIT};
    use crate::options::{cleanup, ignore_top_function, max_retries, max_sleep, pretty};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use taskleak_common::{Frame, SnapshotError};

    /// Replays one snapshot per call; the last one repeats forever.
    struct Script {
        snapshots: Mutex<VecDeque<Vec<TaskRecord>>>,
        calls: AtomicUsize,
        current: Option<TaskId>,
    }

    impl Script {
        fn new(snapshots: Vec<Vec<TaskRecord>>) -> Self {
            Self {
                snapshots: Mutex::new(snapshots.into()),
                calls: AtomicUsize::new(0),
                current: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TaskSource for Script {
        fn snapshot(&self) -> Result<Vec<TaskRecord>, SnapshotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut snapshots = self.snapshots.lock().unwrap();
            let next =
                if snapshots.len() > 1 { snapshots.pop_front() } else { snapshots.front().cloned() };
            Ok(next.unwrap_or_default())
        }

        fn current(&self) -> Option<TaskId> {
            self.current
        }
    }

    struct Broken;

    impl TaskSource for Broken {
        fn snapshot(&self) -> Result<Vec<TaskRecord>, SnapshotError> {
            Err(SnapshotError::Unavailable("no tasks for you".to_string()))
        }
    }

    fn harness(id: u64) -> TaskRecord {
        let frames = vec![Frame::new("test::run_tests"), Frame::new(TASK_EXIT)];
        TaskRecord::new(TaskId(id), STATE_CHAN_RECEIVE, frames)
    }

    fn user(id: u64, top: &str) -> TaskRecord {
        TaskRecord::new(TaskId(id), "running", vec![Frame::new(top), Frame::new(TASK_EXIT)])
    }

    fn fast() -> [LeakOption; 2] {
        [max_retries(1), max_sleep(Duration::from_millis(1))]
    }

    #[test]
    fn test_clean_on_first_attempt() {
        let source = Script::new(vec![vec![harness(1)]]);
        assert!(find(&source, []).is_ok());
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_waits_for_tasks_winding_down() {
        let source =
            Script::new(vec![vec![harness(1), user(2, "app::shutdown")], vec![harness(1)]]);
        assert!(find(&source, []).is_ok());
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_leak_reports_last_attempt() {
        let source = Script::new(vec![
            vec![user(2, "app::a"), user(3, "app::b")],
            vec![user(3, "app::b")],
        ]);

        let err = find(&source, fast()).unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.attempts(), 2);
        assert_eq!(report.tasks().iter().map(TaskRecord::id).collect::<Vec<_>>(), [TaskId(3)]);
    }

    #[test]
    fn test_zero_retries_takes_one_snapshot() {
        let source = Script::new(vec![vec![user(2, "app::a")]]);
        let err = find(&source, [max_retries(0)]).unwrap_err();
        assert_eq!(source.calls(), 1);
        assert_eq!(err.report().map(LeakReport::attempts), Some(1));
    }

    #[test]
    fn test_filters_only_reports_everything() {
        let source = Script::new(vec![vec![harness(1)]]);
        let config = Config::build_filters_only(fast());
        let err = find_with(&source, &config).unwrap_err();
        assert_eq!(err.report().map(LeakReport::len), Some(1));
    }

    #[test]
    fn test_current_task_is_never_reported() {
        let mut source = Script::new(vec![vec![user(7, "app::checker")]]);
        source.current = Some(TaskId(7));
        assert!(find(&source, [max_retries(0)]).is_ok());
    }

    #[test]
    fn test_user_filters_apply() {
        let source = Script::new(vec![vec![user(2, "app::pool::worker")]]);
        assert!(find(&source, [ignore_top_function("app::pool::worker")]).is_ok());
    }

    #[test]
    fn test_find_rejects_cleanup() {
        let source = Script::new(vec![vec![]]);
        let err = find(&source, [cleanup(|_| {})]).unwrap_err();
        assert!(matches!(err, LeakError::CleanupNotAllowed));
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn test_snapshot_error_propagates() {
        let err = find(&Broken, []).unwrap_err();
        assert!(matches!(err, LeakError::Snapshot(_)));
    }

    #[test]
    fn test_pretty_report() {
        let source = Script::new(vec![vec![user(2, "app::a")]]);
        let err = find(&source, [max_retries(0), pretty()]).unwrap_err();
        assert!(err.to_string().contains("Task#2 [running]:\n    app::a\n"));
    }

    #[test]
    fn test_verify_none_passes_and_runs_cleanup() {
        let seen = Arc::new(AtomicI32::new(-1));
        let hook = Arc::clone(&seen);
        let source = Script::new(vec![vec![harness(1)]]);

        verify_none(&source, [cleanup(move |code| hook.store(code, Ordering::SeqCst))]);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "found unexpected tasks")]
    fn test_verify_none_panics_on_leak() {
        let source = Script::new(vec![vec![user(2, "app::a")]]);
        verify_none(&source, [max_retries(0)]);
    }

    #[test]
    fn test_verify_none_runs_cleanup_before_panicking() {
        let seen = Arc::new(AtomicI32::new(-1));
        let hook = Arc::clone(&seen);

        let result = std::panic::catch_unwind(move || {
            let source = Script::new(vec![vec![user(2, "app::a")]]);
            let hook = cleanup(move |code| hook.store(code, Ordering::SeqCst));
            verify_none(&source, [max_retries(0), hook]);
        });

        assert!(result.is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_verify_main_passes_code_through() {
        let seen = Arc::new(AtomicI32::new(-1));
        let hook = Arc::clone(&seen);
        let source = Script::new(vec![vec![user(2, "app::a")]]);

        let hook = cleanup(move |code| hook.store(code, Ordering::SeqCst));
        let code = verify_main(&source, || 3, [hook]);

        assert_eq!(code, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        // A failing suite is not checked for leaks
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn test_verify_main_turns_leak_into_failure() {
        let seen = Arc::new(AtomicI32::new(-1));
        let hook = Arc::clone(&seen);
        let source = Script::new(vec![vec![user(2, "app::a")]]);

        let mut options = fast().to_vec();
        options.push(cleanup(move |code| hook.store(code, Ordering::SeqCst)));
        let code = verify_main(&source, || 0, options);

        assert_eq!(code, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_verify_main_clean_run() {
        let source = Script::new(vec![vec![harness(1)]]);
        assert_eq!(verify_main(&source, || 0, []), 0);
    }
}
