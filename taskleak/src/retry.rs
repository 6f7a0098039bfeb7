//! Bounded retry with exponential backoff.
//!
//! Tasks that are still winding down when the check starts should not be
//! reported, so the detector re-snapshots until nothing unexpected remains or
//! the retry budget runs out:
//!
//! ```text
//!            ┌──────────────┐  empty   ┌───────────┐
//!    ───────▶│  Attempting  │─────────▶│ Succeeded │
//!            └──────┬───────┘          └───────────┘
//!      sleep,  ▲    │ attempt == max_retries
//!      attempt+1    ▼
//!            └──────┘             ┌───────────┐
//!                    ────────────▶│ Exhausted │
//!                                 └───────────┘
//! ```
//!
//! The sleep before retry `i` is `min(max_sleep, 1µs << i)`. The loop is
//! synchronous and runs on the caller's thread.

use std::time::Duration;

use log::debug;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Default cap on a single backoff sleep.
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_millis(100);

/// First backoff sleep; each retry doubles it.
pub const BASE_DELAY: Duration = Duration::from_micros(1);

/// Final state of a retry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// An attempt found nothing unexpected.
    Succeeded { attempts: u32 },
    /// The budget ran out; `remaining` comes from the last attempt only.
    Exhausted { attempts: u32, remaining: Vec<T> },
}

impl<T> Outcome<T> {
    /// Number of attempts performed, including the first one.
    pub fn attempts(&self) -> u32 {
        match self {
            Outcome::Succeeded { attempts } | Outcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }
}

/// Retry budget and backoff cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    max_retries: u32,
    max_sleep: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_MAX_SLEEP)
    }
}

impl Backoff {
    pub fn new(max_retries: u32, max_sleep: Duration) -> Self {
        Self { max_retries, max_sleep }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_sleep(&self) -> Duration {
        self.max_sleep
    }

    /// Sleep before retrying after attempt `attempt` (0-based).
    ///
    /// Doubles from [`BASE_DELAY`], saturates instead of overflowing, and
    /// never exceeds `max_sleep`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = u64::try_from(BASE_DELAY.as_micros()).unwrap_or(u64::MAX);
        let micros = base.checked_shl(attempt).filter(|m| m >> attempt == base).unwrap_or(u64::MAX);
        Duration::from_micros(micros).min(self.max_sleep)
    }

    /// Returns true if another attempt is allowed after attempt `attempt`.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Drive `attempt_fn` until it returns an empty list or the budget is spent.
    ///
    /// `attempt_fn` receives the 0-based attempt index and returns the
    /// unexpected items it found. `sleep` is called with the backoff delay
    /// between attempts and never after the last one.
    ///
    /// # Errors
    /// Returns the first error produced by `attempt_fn`; no further attempts
    /// are made after an error.
    pub fn run<T, E, A, S>(&self, mut attempt_fn: A, mut sleep: S) -> Result<Outcome<T>, E>
    where
        A: FnMut(u32) -> Result<Vec<T>, E>,
        S: FnMut(Duration),
    {
        let mut attempt = 0u32;
        loop {
            let remaining = attempt_fn(attempt)?;
            let attempts = attempt.saturating_add(1);

            if remaining.is_empty() {
                return Ok(Outcome::Succeeded { attempts });
            }
            if !self.should_retry(attempt) {
                return Ok(Outcome::Exhausted { attempts, remaining });
            }

            let delay = self.delay(attempt);
            debug!(
                "Attempt {attempt}: {} unexpected, retrying in {delay:?}",
                remaining.len()
            );
            sleep(delay);
            attempt += 1;
        }
    }
}
