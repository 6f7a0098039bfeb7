//! Composable options for a detection run.
//!
//! Every option is a plain value; [`Config::build`](crate::Config::build)
//! folds them left to right. Filter options only capture their own argument,
//! so options never depend on each other and can be given in any order.
//!
//! Arguments are not validated. An empty or misspelled function name is
//! accepted and simply never matches.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use regex::Regex;
use taskleak_common::TaskRecord;

use crate::config::CleanupFn;
use crate::filter::Filter;

/// Separator between a path qualifier and the items nested under it.
pub const PATH_SEPARATOR: &str = "::";

/// One configuration directive.
#[derive(Clone)]
pub enum LeakOption {
    /// Mark tasks matching the filter as benign.
    Filter(Filter),
    /// Retries after the first attempt.
    MaxRetries(u32),
    /// Cap on a single backoff sleep.
    MaxSleep(Duration),
    /// Run after verification with the exit status.
    Cleanup(CleanupFn),
    /// Human-readable, multi-line leak reports.
    Pretty,
}

impl From<Filter> for LeakOption {
    fn from(filter: Filter) -> Self {
        LeakOption::Filter(filter)
    }
}

// =============================================================================
// FILTERS
// =============================================================================

/// Ignore tasks whose top function is exactly `function`.
///
/// The name must be fully qualified, e.g. `myapp::server::accept_loop`.
pub fn ignore_top_function(function: impl Into<String>) -> LeakOption {
    let function = function.into();
    let label = format!("top function {function}");
    if function.is_empty() {
        return inert(label);
    }
    Filter::new(label, move |task: &TaskRecord| task.top_function() == function).into()
}

/// Ignore tasks with `function` anywhere in their frames.
///
/// For methods the fully qualified form looks like
/// `myapp::pool::Pool::worker_loop`.
pub fn ignore_any_function(function: impl Into<String>) -> LeakOption {
    let function = function.into();
    let label = format!("any function {function}");
    if function.is_empty() {
        return inert(label);
    }
    Filter::new(label, move |task: &TaskRecord| task.has_function(&function)).into()
}

/// Ignore tasks where any frame's raw text contains `entry`.
///
/// Raw text includes the frame location, so a file name or line works too.
pub fn ignore_any_entry(entry: impl Into<String>) -> LeakOption {
    let entry = entry.into();
    let label = format!("any entry {entry}");
    if entry.is_empty() {
        return inert(label);
    }
    Filter::new(label, move |task: &TaskRecord| task.match_any_entry(&entry)).into()
}

/// Ignore tasks with a frame inside package `pkg`.
///
/// `pkg` is taken literally, e.g. `myapp::net`; it matches
/// `myapp::net::listen` but not `myapp::network::listen`.
pub fn ignore_any_containing_pkg(pkg: &str) -> LeakOption {
    any_function_nested_under(pkg, "package")
}

/// Ignore tasks with a frame inside any method of type `ty`.
///
/// `ty` is taken literally, e.g. `myapp::pool::Pool` or
/// `<myapp::pool::Pool as myapp::Run>`.
pub fn ignore_any_containing_struct(ty: &str) -> LeakOption {
    any_function_nested_under(ty, "struct")
}

/// Ignore tasks with at least one frame inside package `pkg`.
///
/// A task with frames both inside and outside `pkg` is ignored too. Behaves
/// exactly like [`ignore_any_containing_pkg`].
pub fn include_all_containing_pkg(pkg: &str) -> LeakOption {
    any_function_nested_under(pkg, "include package")
}

/// Match frames whose function contains `qualifier::<something>`.
///
/// The qualifier is escaped in full; only the suffix after the separator is
/// a wildcard. An empty qualifier matches nothing.
fn any_function_nested_under(qualifier: &str, kind: &str) -> LeakOption {
    let label = format!("{kind} {qualifier}");
    if qualifier.is_empty() {
        return inert(label);
    }
    match nested_pattern(qualifier) {
        Ok(pattern) => Filter::new(label, move |task: &TaskRecord| {
            task.frames().iter().any(|frame| pattern.is_match(&frame.function))
        })
        .into(),
        Err(err) => {
            warn!("Ignoring {label}: {err}");
            inert(label)
        }
    }
}

/// A filter that never matches; stands in for empty or unusable arguments.
fn inert(label: String) -> LeakOption {
    Filter::new(label, |_: &TaskRecord| false).into()
}

fn nested_pattern(qualifier: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("{}{}.+", regex::escape(qualifier), regex::escape(PATH_SEPARATOR)))
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Retries after the first attempt. `0` means a single pass.
pub fn max_retries(retries: u32) -> LeakOption {
    LeakOption::MaxRetries(retries)
}

/// Cap on a single backoff sleep.
pub fn max_sleep(duration: Duration) -> LeakOption {
    LeakOption::MaxSleep(duration)
}

/// Multi-line leak reports with one frame per line.
pub fn pretty() -> LeakOption {
    LeakOption::Pretty
}

/// Run `f` at the end of verification.
///
/// [`verify_main`](crate::verify_main) passes the suite's exit code,
/// [`verify_none`](crate::verify_none) passes 0. [`find`](crate::find)
/// rejects configurations carrying a cleanup.
pub fn cleanup<F>(f: F) -> LeakOption
where
    F: Fn(i32) + Send + Sync + 'static,
{
    LeakOption::Cleanup(Arc::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use taskleak_common::{Frame, TaskId};

    fn task(frames: Vec<Frame>) -> TaskRecord {
        TaskRecord::new(TaskId(5), "running", frames)
    }

    fn expected(option: LeakOption, t: &TaskRecord) -> bool {
        Config::build_filters_only([option]).is_expected(t)
    }

    #[test]
    fn test_ignore_top_function_is_exact() {
        let t = task(vec![Frame::new("app::worker::run"), Frame::new("app::main")]);
        assert!(expected(ignore_top_function("app::worker::run"), &t));
        assert!(!expected(ignore_top_function("app::worker"), &t));
        assert!(!expected(ignore_top_function("app::main"), &t));
    }

    #[test]
    fn test_ignore_any_function() {
        let t = task(vec![Frame::new("app::worker::run"), Frame::new("app::main")]);
        assert!(expected(ignore_any_function("app::main"), &t));
        assert!(!expected(ignore_any_function("app::mai"), &t));
    }

    #[test]
    fn test_empty_names_never_match() {
        let t = task(vec![Frame::new("app::worker::run")]);
        assert!(!expected(ignore_top_function(""), &t));
        assert!(!expected(ignore_any_function(""), &t));
        assert!(!expected(ignore_any_containing_pkg(""), &t));
        assert!(!expected(ignore_any_entry(""), &t));
        assert!(!expected(ignore_top_function(""), &task(Vec::new())));
    }

    #[test]
    fn test_ignore_any_entry_matches_locations() {
        let t = task(vec![Frame::at("app::worker::run", "src/worker.rs:17:5")]);
        assert!(expected(ignore_any_entry("src/worker.rs"), &t));
        assert!(expected(ignore_any_entry("worker::run"), &t));
        assert!(!expected(ignore_any_entry("src/main.rs"), &t));
    }

    #[test]
    fn test_containing_pkg_requires_separator_and_suffix() {
        let nested = task(vec![Frame::new("app::net::listen")]);
        let sibling = task(vec![Frame::new("app::network::listen")]);
        let bare = task(vec![Frame::new("app::net")]);
        let bare_sep = task(vec![Frame::new("app::net::")]);

        assert!(expected(ignore_any_containing_pkg("app::net"), &nested));
        assert!(!expected(ignore_any_containing_pkg("app::net"), &sibling));
        assert!(!expected(ignore_any_containing_pkg("app::net"), &bare));
        assert!(!expected(ignore_any_containing_pkg("app::net"), &bare_sep));
    }

    #[test]
    fn test_containing_struct_escapes_qualifier() {
        let method = task(vec![Frame::new("<app::Pool as app::Run>::run")]);
        let lookalike = task(vec![Frame::new("<app::PoolXas app::Run>::run")]);

        assert!(expected(ignore_any_containing_struct("<app::Pool as app::Run>"), &method));
        assert!(!expected(ignore_any_containing_struct("<app::Pool.as app::Run>"), &lookalike));
        assert!(!expected(ignore_any_containing_struct("app::Pool"), &lookalike));
    }

    #[test]
    fn test_include_all_matches_like_containing_pkg() {
        let tasks = [
            task(vec![Frame::new("app::net::listen")]),
            task(vec![Frame::new("other::net::listen")]),
            task(vec![Frame::new("main"), Frame::new("app::net::Conn::read")]),
        ];
        for t in &tasks {
            assert_eq!(
                expected(include_all_containing_pkg("app::net"), t),
                expected(ignore_any_containing_pkg("app::net"), t)
            );
        }
        // One frame inside the package is enough, even with frames outside it
        assert!(expected(include_all_containing_pkg("app::net"), &tasks[2]));
        assert!(!expected(include_all_containing_pkg("app::net"), &tasks[1]));
    }

    #[test]
    fn test_settings() {
        assert!(matches!(max_retries(4), LeakOption::MaxRetries(4)));
        assert!(matches!(pretty(), LeakOption::Pretty));
        assert!(matches!(
            max_sleep(Duration::from_millis(2)),
            LeakOption::MaxSleep(d) if d == Duration::from_millis(2)
        ));
    }
}
