//! In-process registry of tracked threads and Tokio tasks.
//!
//! Rust does not let a process list its threads' stacks, so the tracker
//! records what it can see at spawn time instead: the entry closure's type
//! name, the function that spawned it, and the spawn location. A record lives
//! exactly as long as the task does; it is removed when the closure returns or
//! unwinds, or when the future completes or is dropped.
//!
//! ```rust,ignore
//! let tracker = Tracker::new();
//! let handle = tracker.spawn_thread(|| serve(rx))?;
//! // ...
//! taskleak::verify_none(&tracker, []);
//! ```

use std::any::type_name;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::panic::Location;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use log::debug;
use taskleak_common::{Frame, SnapshotError, TaskId, TaskRecord, TaskSource};

use crate::classification::names::{STATE_IDLE, STATE_RUNNABLE, STATE_RUNNING, TASK_EXIT};

/// Distinguishes trackers in the thread-local "current task" slot.
static NEXT_TRACKER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// (tracker id, task id) of the tracked task running on this thread
    static CURRENT: Cell<Option<(u64, TaskId)>> = const { Cell::new(None) };
}

struct Entry {
    state: String,
    frames: Vec<Frame>,
}

struct Registry {
    tracker_id: u64,
    next_task_id: AtomicU64,
    tasks: Mutex<BTreeMap<TaskId, Entry>>,
}

impl Registry {
    /// A panic while holding the lock cannot leave the map half-updated.
    fn tasks(&self) -> MutexGuard<'_, BTreeMap<TaskId, Entry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a task's state, returning the previous one.
    fn set_state(&self, id: TaskId, state: String) -> Option<String> {
        self.tasks().get_mut(&id).map(|entry| std::mem::replace(&mut entry.state, state))
    }
}

/// Keeps a task's record alive; dropping it unregisters the task.
struct Registration {
    registry: Arc<Registry>,
    id: TaskId,
}

impl Registration {
    fn set_state(&self, state: &str) {
        let mut tasks = self.registry.tasks();
        if let Some(entry) = tasks.get_mut(&self.id) {
            if entry.state != state {
                state.clone_into(&mut entry.state);
            }
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.tasks().remove(&self.id);
        debug!("{} finished", self.id);
    }
}

/// Marks this thread as running a tracked task until dropped.
struct CurrentGuard {
    previous: Option<(u64, TaskId)>,
}

impl CurrentGuard {
    fn enter(tracker_id: u64, id: TaskId) -> Self {
        Self { previous: CURRENT.with(|current| current.replace(Some((tracker_id, id)))) }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(self.previous));
    }
}

/// Restores a tracked task's previous state when dropped.
///
/// Returned by [`Tracker::enter_state`].
#[must_use = "the state is restored as soon as the guard is dropped"]
pub struct StateGuard {
    registry: Arc<Registry>,
    id: TaskId,
    previous: Option<String>,
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.registry.set_state(self.id, previous);
        }
    }
}

/// Registry of tracked tasks; also a [`TaskSource`].
///
/// Clones share the same registry.
#[derive(Clone)]
pub struct Tracker {
    registry: Arc<Registry>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                tracker_id: NEXT_TRACKER_ID.fetch_add(1, Ordering::Relaxed),
                next_task_id: AtomicU64::new(1),
                tasks: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Spawn a tracked OS thread.
    ///
    /// The task is registered before this returns, so a check right after
    /// the spawn already sees it.
    ///
    /// # Errors
    /// Returns an error if the OS refuses to create the thread.
    #[track_caller]
    pub fn spawn_thread<F, T>(&self, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let frames = spawn_frames::<F>(None);
        self.spawn_with(thread::Builder::new(), frames, f)
    }

    /// Spawn a tracked OS thread with a name.
    ///
    /// The name becomes both the thread name and the record's top function.
    ///
    /// # Errors
    /// Returns an error if the OS refuses to create the thread.
    #[track_caller]
    pub fn spawn_thread_named<F, T>(
        &self,
        name: impl Into<String>,
        f: F,
    ) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let name = name.into();
        let frames = spawn_frames::<F>(Some(&name));
        self.spawn_with(thread::Builder::new().name(name), frames, f)
    }

    fn spawn_with<F, T>(
        &self,
        builder: thread::Builder,
        frames: Vec<Frame>,
        f: F,
    ) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let registration = self.register(STATE_RUNNING, frames);
        let tracker_id = self.registry.tracker_id;

        builder.spawn(move || {
            let _current = CurrentGuard::enter(tracker_id, registration.id);
            let _registration = registration;
            f()
        })
    }

    /// Spawn a tracked task on the current Tokio runtime.
    ///
    /// The record reports `runnable` until first polled, `running` while
    /// polled and `idle` between polls.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime, like [`tokio::spawn`].
    #[track_caller]
    pub fn spawn_task<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let frames = spawn_frames::<F>(None);
        let registration = self.register(STATE_RUNNABLE, frames);
        tokio::spawn(TrackedFuture { inner: Box::pin(future), registration })
    }

    /// Annotate the calling tracked thread with `state` until the guard drops.
    ///
    /// Use it around blocking calls, e.g. `"chan receive"` around a channel
    /// receive. Returns `None` if the calling thread is not a task of this
    /// tracker.
    pub fn enter_state(&self, state: impl Into<String>) -> Option<StateGuard> {
        let id = self.current()?;
        let previous = self.registry.set_state(id, state.into())?;
        Some(StateGuard { registry: Arc::clone(&self.registry), id, previous: Some(previous) })
    }

    /// Number of tracked tasks alive.
    pub fn len(&self) -> usize {
        self.registry.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, state: &str, frames: Vec<Frame>) -> Registration {
        let id = TaskId(self.registry.next_task_id.fetch_add(1, Ordering::Relaxed));
        debug!("Tracking {id} ({})", frames.first().map_or("", |f| f.function.as_str()));
        self.registry.tasks().insert(id, Entry { state: state.to_owned(), frames });
        Registration { registry: Arc::clone(&self.registry), id }
    }
}

impl TaskSource for Tracker {
    fn snapshot(&self) -> Result<Vec<TaskRecord>, SnapshotError> {
        let tasks = self.registry.tasks();
        Ok(tasks
            .iter()
            .map(|(id, entry)| TaskRecord::new(*id, entry.state.clone(), entry.frames.clone()))
            .collect())
    }

    fn current(&self) -> Option<TaskId> {
        let tracker_id = self.registry.tracker_id;
        CURRENT.with(Cell::get).and_then(|(owner, id)| (owner == tracker_id).then_some(id))
    }
}

/// Process-wide tracker, initialized on first access.
static GLOBAL: OnceLock<Tracker> = OnceLock::new();

/// Get the process-wide tracker.
pub fn global() -> &'static Tracker {
    GLOBAL.get_or_init(Tracker::new)
}

// =============================================================================
// TOKIO TASKS
// =============================================================================

struct TrackedFuture<F> {
    inner: Pin<Box<F>>,
    registration: Registration,
}

impl<F: Future> Future for TrackedFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.registration.set_state(STATE_RUNNING);

        let poll = {
            let _current =
                CurrentGuard::enter(this.registration.registry.tracker_id, this.registration.id);
            this.inner.as_mut().poll(cx)
        };

        if poll.is_pending() {
            this.registration.set_state(STATE_IDLE);
        }
        poll
    }
}

// =============================================================================
// FRAMES
// =============================================================================

/// Frames for a task whose entry point has type `F`.
///
/// ```text
/// [name]                                   (named threads only)
/// app::serve::{{closure}}                  entry
/// app::serve at src/serve.rs:12:20         spawning function, spawn site
/// std::sys::pal::unix::thread::...         task exit
/// ```
#[track_caller]
fn spawn_frames<F>(name: Option<&str>) -> Vec<Frame> {
    let caller = Location::caller();
    let site = format!("{}:{}:{}", caller.file(), caller.line(), caller.column());
    let entry = type_name::<F>();

    let mut frames = Vec::with_capacity(4);
    if let Some(name) = name {
        frames.push(Frame::new(name));
    }
    match spawner_of(entry) {
        Some(spawner) => {
            frames.push(Frame::new(entry));
            frames.push(Frame::at(spawner, site));
        }
        None => frames.push(Frame::at(entry, site)),
    }
    frames.push(Frame::new(TASK_EXIT));
    frames
}

/// The function a closure or async block was written in.
///
/// `app::serve::{{closure}}::{{closure}}` was written in `app::serve`; a
/// plain function item has no enclosing function.
fn spawner_of(entry: &str) -> Option<&str> {
    let mut name = entry;
    while let Some(outer) = name.strip_suffix("::{{closure}}") {
        name = outer;
    }
    (name.len() != entry.len() && !name.is_empty()).then_some(name)
}
