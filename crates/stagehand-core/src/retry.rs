//! # Retry Module
//!
//! Bounded retry with a pluggable delay.
//!
//! Every registry call in the promotion workflow runs through
//! [`RetryPolicy::run`]. The delay between attempts goes through a
//! [`Sleeper`], so tests swap the blocking sleep for a [`RecordingSleeper`]
//! and no wall-clock time passes.

use std::cell::RefCell;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// DEFAULTS
// =============================================================================

/// Attempts per registry call, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Fixed wait between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

// =============================================================================
// SLEEPER
// =============================================================================

/// Suspends the caller between retry attempts.
pub trait Sleeper {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Blocking sleep on the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock: records requested sleeps and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    /// Total virtual time slept.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.sleeps.borrow().iter().copied().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

// =============================================================================
// BACKOFF
// =============================================================================

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// `base + step * (failed_attempt - 1)`.
    Linear {
        /// Delay after the first failure.
        base: Duration,
        /// Added for each further failure.
        step: Duration,
    },
}

impl Backoff {
    /// Delay to wait after failed attempt number `failed_attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear { base, step } => {
                base.saturating_add(step.saturating_mul(failed_attempt.saturating_sub(1)))
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(DEFAULT_RETRY_DELAY)
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// A step that failed on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// Attempts made (equals the policy's `max_attempts`).
    pub attempts: u32,
    /// Error from the final attempt.
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempt(s): {}", self.attempts, self.last_error)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhausted<E> {}

/// Bounded retry: up to `max_attempts` calls, sleeping per [`Backoff`]
/// between them (never after the last).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Fixed-delay policy.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    /// Attempts per call, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The delay schedule.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. Each failure is logged with
    /// `label`; the last error is returned inside [`RetryExhausted`].
    pub fn run<T, E, S, F>(&self, sleeper: &S, label: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        E: fmt::Display,
        S: Sleeper + ?Sized,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(step = label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if attempt >= self.max_attempts => {
                    warn!(
                        step = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        %error,
                        "attempt failed, retry budget exhausted"
                    );
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                Err(error) => {
                    let delay = self.backoff.delay_after(attempt);
                    warn!(
                        step = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "attempt failed, retrying"
                    );
                    sleeper.sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_on_first_attempt_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let result: Result<u32, RetryExhausted<String>> =
            RetryPolicy::default().run(&sleeper, "noop", |attempt| Ok(attempt));
        assert_eq!(result, Ok(1));
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn exhausts_after_max_attempts_with_sleeps_between() {
        let sleeper = RecordingSleeper::new();
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::default().run(&sleeper, "always-fails", |attempt| {
            calls += 1;
            Err(format!("boom {attempt}"))
        });

        assert_eq!(calls, 3);
        assert_eq!(
            result,
            Err(RetryExhausted {
                attempts: 3,
                last_error: "boom 3".to_string()
            })
        );
        assert_eq!(sleeper.sleeps(), vec![DEFAULT_RETRY_DELAY, DEFAULT_RETRY_DELAY]);
    }

    #[test]
    fn one_failure_costs_one_wait() {
        let sleeper = RecordingSleeper::new();
        let result = RetryPolicy::fixed(3, Duration::from_secs(5)).run(&sleeper, "flaky", |attempt| {
            if attempt == 1 { Err("transient") } else { Ok(attempt) }
        });
        assert_eq!(result, Ok(2));
        assert_eq!(sleeper.total(), Duration::from_secs(5));
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        let policy = RetryPolicy::fixed(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn linear_backoff_grows_by_step() {
        let backoff = Backoff::Linear {
            base: Duration::from_secs(1),
            step: Duration::from_secs(2),
        };
        assert_eq!(backoff.delay_after(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_after(2), Duration::from_secs(3));
        assert_eq!(backoff.delay_after(3), Duration::from_secs(5));
    }

    #[test]
    fn exhausted_display_mentions_attempts() {
        let exhausted = RetryExhausted {
            attempts: 3,
            last_error: "timeout",
        };
        assert_eq!(exhausted.to_string(), "gave up after 3 attempt(s): timeout");
    }
}
