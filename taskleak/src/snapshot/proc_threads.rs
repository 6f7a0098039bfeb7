//! OS thread enumeration via the /proc filesystem (Linux)
//!
//! Lists every thread of a process by reading `/proc/<pid>/task/*`. The
//! kernel exposes no user-space stack, so each record carries:
//!
//! - **Top function**: the thread name from `comm` (truncated to 15 bytes)
//! - **Wait channel**: the kernel function the thread sleeps in, from `wchan`
//! - **Bottom frame**: the std thread entry, or the runtime entry for the
//!   main thread
//!
//! The state combines the `stat` state letter with the wait channel, so a
//! thread parked on a futex reads as `chan receive` and one sleeping in
//! `epoll_wait` or a socket read reads as `IO wait`. Unrecognised waits read
//! as `waiting`; an OS thread is never labelled `syscall`, which the default
//! classifiers treat as benign.

use anyhow::{bail, Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use taskleak_common::{Frame, SnapshotError, TaskId, TaskRecord, TaskSource};

use crate::classification::names::{
    MAIN_ENTRY, STATE_CHAN_RECEIVE, STATE_DEAD, STATE_IDLE, STATE_IO_WAIT, STATE_RUNNING,
    STATE_SLEEP, STATE_STOPPED, STATE_WAITING, TASK_EXIT,
};

/// Location attached to wait-channel frames.
const KERNEL_LOCATION: &str = "[kernel]";

/// Wait channel fragments of readiness, socket and pipe waits.
const IO_WAIT_CHANNELS: &[&str] =
    &["poll", "select", "sk_wait", "accept", "pipe_", "unix_stream", "wait_woken", "tcp_"];

/// Threads of one process, read from a /proc-like directory.
#[derive(Debug, Clone)]
pub struct ProcThreads {
    /// Process directory, e.g. `/proc/self`
    root: PathBuf,
}

impl Default for ProcThreads {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcThreads {
    /// Threads of the calling process.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/proc/self")
    }

    /// Threads of the process described by `root` (a `/proc/<pid>` layout).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// PID of the process, from `<root>/stat`.
    fn pid(&self) -> Option<u64> {
        let stat = fs::read_to_string(self.root.join("stat")).ok()?;
        stat.split_whitespace().next()?.parse().ok()
    }
}

impl TaskSource for ProcThreads {
    fn snapshot(&self) -> Result<Vec<TaskRecord>, SnapshotError> {
        let task_dir = self.root.join("task");
        let entries = fs::read_dir(&task_dir)
            .map_err(|source| SnapshotError::Io { path: task_dir.clone(), source })?;
        let pid = self.pid();

        let mut records: Vec<TaskRecord> = entries
            .flatten()
            .filter_map(|entry| {
                let tid = entry.file_name().to_string_lossy().parse::<u64>().ok()?;
                // Threads may exit between listing and reading
                match read_thread(&entry.path(), tid, pid == Some(tid)) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        debug!("Skipping thread {tid}: {e:#}");
                        None
                    }
                }
            })
            .collect();

        records.sort_by_key(TaskRecord::id);
        Ok(records)
    }

    fn current(&self) -> Option<TaskId> {
        // /proc/thread-self -> "<pid>/task/<tid>"
        let link = fs::read_link(self.root.parent()?.join("thread-self")).ok()?;
        let tid = link.file_name()?.to_str()?.parse().ok()?;
        Some(TaskId(tid))
    }
}

/// Build a record from `/proc/<pid>/task/<tid>`.
fn read_thread(dir: &Path, tid: u64, is_main: bool) -> Result<TaskRecord> {
    let comm_path = dir.join("comm");
    let comm = fs::read_to_string(&comm_path)
        .with_context(|| format!("Failed to read {}", comm_path.display()))?;

    let stat_path = dir.join("stat");
    let stat = fs::read_to_string(&stat_path)
        .with_context(|| format!("Failed to read {}", stat_path.display()))?;
    let letter = extract_state(&stat)?;

    // wchan is "0" for running threads and on kernels that hide it
    let wchan = fs::read_to_string(dir.join("wchan"))
        .ok()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty() && w != "0");

    let mut frames = vec![Frame::new(comm.trim())];
    if let Some(wchan) = &wchan {
        frames.push(Frame::at(wchan.as_str(), KERNEL_LOCATION));
    }
    frames.push(Frame::new(if is_main { MAIN_ENTRY } else { TASK_EXIT }));

    Ok(TaskRecord::new(TaskId(tid), thread_state(letter, wchan.as_deref()), frames))
}

/// Extract the state letter from `/proc/<pid>/task/<tid>/stat`.
/// Format: "tid (comm) state ..."
fn extract_state(stat_line: &str) -> Result<char> {
    let close = stat_line.rfind(')').context("Invalid stat format")?;
    match stat_line[close + 1..].trim_start().chars().next() {
        Some(letter) => Ok(letter),
        None => bail!("Invalid stat format: missing state"),
    }
}

/// Map a stat state letter and wait channel to a task state.
fn thread_state(letter: char, wchan: Option<&str>) -> &'static str {
    match letter {
        'R' => STATE_RUNNING,
        'S' | 'D' => match wchan {
            Some(w) if w.contains("futex") => STATE_CHAN_RECEIVE,
            Some(w) if w.contains("nanosleep") => STATE_SLEEP,
            Some(w) if IO_WAIT_CHANNELS.iter().any(|fragment| w.contains(fragment)) => {
                STATE_IO_WAIT
            }
            _ => STATE_WAITING,
        },
        'T' | 't' => STATE_STOPPED,
        'Z' | 'X' | 'x' => STATE_DEAD,
        'I' => STATE_IDLE,
        _ => STATE_WAITING,
    }
}
