//! Baseline capture: exempt every task alive right now.
//!
//! The snapshot is taken when the option is created, not when detection runs,
//! so a task spawned after [`ignore_current`] is never covered by it.

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use taskleak_common::{SnapshotError, TaskId, TaskRecord, TaskSource};

use crate::filter::Filter;
use crate::options::LeakOption;

/// Record all tasks currently alive in `source` and ignore them later.
///
/// Call this before spawning any task whose leak you want to catch.
///
/// # Errors
/// Returns [`SnapshotError`] if `source` cannot enumerate its tasks.
pub fn ignore_current<S: TaskSource + ?Sized>(source: &S) -> Result<LeakOption, SnapshotError> {
    let baseline: HashSet<TaskId> = source.snapshot()?.iter().map(TaskRecord::id).collect();
    debug!("Captured baseline of {} tasks", baseline.len());
    Ok(ignore_ids(baseline).into())
}

/// Filter matching exactly the given ids.
pub fn ignore_ids(ids: impl IntoIterator<Item = TaskId>) -> Filter {
    let ids: Arc<HashSet<TaskId>> = Arc::new(ids.into_iter().collect());
    let label = format!("baseline of {} tasks", ids.len());
    Filter::new(label, move |task: &TaskRecord| ids.contains(&task.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Mutex;
    use taskleak_common::Frame;

    /// Source whose live set the test edits between calls.
    struct Live(Mutex<Vec<u64>>);

    impl TaskSource for Live {
        fn snapshot(&self) -> Result<Vec<TaskRecord>, SnapshotError> {
            let ids = self.0.lock().map_err(|e| SnapshotError::Unavailable(e.to_string()))?;
            Ok(ids
                .iter()
                .map(|id| TaskRecord::new(TaskId(*id), "running", vec![Frame::new("app::job")]))
                .collect())
        }
    }

    #[test]
    fn test_baseline_covers_existing_tasks_only() {
        let live = Live(Mutex::new(vec![1, 2]));
        let option = ignore_current(&live).unwrap();
        live.0.lock().unwrap().push(3);

        let config = Config::build_filters_only([option]);
        let unexpected: Vec<TaskId> = live
            .snapshot()
            .unwrap()
            .into_iter()
            .filter(|t| !config.is_expected(t))
            .map(|t| t.id())
            .collect();

        assert_eq!(unexpected, [TaskId(3)]);
    }

    #[test]
    fn test_baseline_is_fixed_at_capture_time() {
        let live = Live(Mutex::new(vec![1]));
        let option = ignore_current(&live).unwrap();
        // Task 1 exits, task 4 takes its place after capture
        *live.0.lock().unwrap() = vec![4];

        let config = Config::build_filters_only([option]);
        let t = TaskRecord::new(TaskId(4), "running", Vec::new());
        assert!(!config.is_expected(&t));
    }

    #[test]
    fn test_ignore_ids() {
        let filter = ignore_ids([TaskId(8)]);
        assert!(filter.matches(&TaskRecord::new(TaskId(8), "idle", Vec::new())));
        assert!(!filter.matches(&TaskRecord::new(TaskId(9), "idle", Vec::new())));
        assert_eq!(filter.label(), "baseline of 1 tasks");
    }
}
