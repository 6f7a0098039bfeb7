//! Detector configuration.
//!
//! A [`Config`] is folded from a list of [`LeakOption`] values and never
//! changes afterwards. Filters accumulate; every other setting is last write
//! wins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use taskleak_common::TaskRecord;

use crate::classification::default_filters;
use crate::filter::{Filter, FilterChain};
use crate::options::LeakOption;
use crate::retry::{Backoff, DEFAULT_MAX_RETRIES, DEFAULT_MAX_SLEEP};

/// Callback run after verification with the final exit status.
pub type CleanupFn = Arc<dyn Fn(i32) + Send + Sync>;

/// Settings for one detection run.
#[derive(Clone)]
pub struct Config {
    filters: FilterChain,
    max_retries: u32,
    max_sleep: Duration,
    cleanup: Option<CleanupFn>,
    pretty: bool,
}

impl Config {
    /// Default classifiers first, then the caller's options.
    pub fn build(options: impl IntoIterator<Item = LeakOption>) -> Self {
        let mut config = Self::empty();
        for filter in default_filters() {
            config.filters.push(filter);
        }
        config.apply_all(options);
        config
    }

    /// Only the caller's options; no test-harness or syscall special cases.
    pub fn build_filters_only(options: impl IntoIterator<Item = LeakOption>) -> Self {
        let mut config = Self::empty();
        config.apply_all(options);
        config
    }

    fn empty() -> Self {
        Self {
            filters: FilterChain::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            max_sleep: DEFAULT_MAX_SLEEP,
            cleanup: None,
            pretty: false,
        }
    }

    fn apply_all(&mut self, options: impl IntoIterator<Item = LeakOption>) {
        for option in options {
            self.apply(option);
        }
    }

    fn apply(&mut self, option: LeakOption) {
        match option {
            LeakOption::Filter(filter) => self.filters.push(filter),
            LeakOption::MaxRetries(n) => self.max_retries = n,
            LeakOption::MaxSleep(d) => self.max_sleep = d,
            LeakOption::Cleanup(f) => self.cleanup = Some(f),
            LeakOption::Pretty => self.pretty = true,
        }
    }

    /// Returns true if some filter marks `task` as benign.
    #[must_use]
    pub fn is_expected(&self, task: &TaskRecord) -> bool {
        self.filters.matches(task)
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_sleep(&self) -> Duration {
        self.max_sleep
    }

    pub fn pretty(&self) -> bool {
        self.pretty
    }

    pub fn cleanup(&self) -> Option<&CleanupFn> {
        self.cleanup.as_ref()
    }

    /// Detach the cleanup callback so the caller can run it after detection.
    pub(crate) fn take_cleanup(&mut self) -> Option<CleanupFn> {
        self.cleanup.take()
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.max_retries, self.max_sleep)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.filters.iter().map(Filter::label).collect();
        f.debug_struct("Config")
            .field("filters", &labels)
            .field("max_retries", &self.max_retries)
            .field("max_sleep", &self.max_sleep)
            .field("cleanup", &self.cleanup.is_some())
            .field("pretty", &self.pretty)
            .finish()
    }
}
