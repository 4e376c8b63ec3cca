//! Retry bookkeeping with exponential backoff.
//!
//! One `RetryPolicy` instance tracks the attempts of one operation (one range,
//! or one whole-body download). All failures are equally retryable; the caller
//! checks cancellation before each attempt and re-raises the last error once
//! the budget is spent.

use std::time::Duration;

/// Stateful attempt counter with exponential delay between attempts.
#[derive(Debug)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            attempts: 0,
        }
    }

    /// Failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True while another attempt fits in the budget. Holds before the first
    /// attempt as well: attempt first, then possibly retry.
    pub fn should_retry(&self) -> bool {
        self.attempts <= self.max_retries
    }

    /// Delay before the next attempt: `initial_delay * 2^attempts`, saturating.
    /// The first retry therefore waits twice the base delay.
    pub fn backoff_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempts.min(16));
        self.initial_delay.saturating_mul(factor)
    }

    /// Record a failed attempt. When the budget still allows a retry, sleeps
    /// the backoff delay and returns true; otherwise returns false and the
    /// caller re-raises the error it observed.
    pub fn handle_error(&mut self) -> bool {
        self.attempts += 1;
        if self.attempts > self.max_retries {
            return false;
        }
        std::thread::sleep(self.backoff_delay());
        true
    }
}
