//! Filter chain: the set of rules that mark a task as expected.
//!
//! A task is expected if ANY filter in the chain matches it. Insertion order
//! only decides which filter gets to short-circuit first.

use std::fmt;
use std::sync::Arc;

use taskleak_common::TaskRecord;

/// Predicate signature. `true` means "benign, exclude from the leak report".
pub type Predicate = dyn Fn(&TaskRecord) -> bool + Send + Sync;

/// A named predicate.
///
/// The label only shows up in `Debug` output and logs; it never affects
/// matching.
#[derive(Clone)]
pub struct Filter {
    label: Arc<str>,
    predicate: Arc<Predicate>,
}

impl Filter {
    pub fn new<F>(label: impl Into<Arc<str>>, predicate: F) -> Self
    where
        F: Fn(&TaskRecord) -> bool + Send + Sync + 'static,
    {
        Self { label: label.into(), predicate: Arc::new(predicate) }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn matches(&self, task: &TaskRecord) -> bool {
        (self.predicate)(task)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.label).finish()
    }
}

/// Ordered OR of filters.
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Returns true iff at least one filter matches `task`.
    ///
    /// An empty chain matches nothing.
    #[must_use]
    pub fn matches(&self, task: &TaskRecord) -> bool {
        self.filters.iter().any(|filter| filter.matches(task))
    }

    /// Label of the first filter matching `task`, for diagnostics.
    pub fn first_match(&self, task: &TaskRecord) -> Option<&str> {
        self.filters.iter().find(|filter| filter.matches(task)).map(Filter::label)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }
}

impl FromIterator<Filter> for FilterChain {
    fn from_iter<I: IntoIterator<Item = Filter>>(iter: I) -> Self {
        Self { filters: iter.into_iter().collect() }
    }
}
