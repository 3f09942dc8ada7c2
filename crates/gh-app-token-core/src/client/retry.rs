//! Retry policy for transient GitHub API failures.

use std::time::Duration;

/// Exponential backoff policy.
///
/// `max_attempts` counts every request, the first one included. With the
/// defaults a request is tried at most three times, waiting 1s and then 2s.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single delay, including server-requested ones.
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,

    /// Whether to add ±25% jitter to computed delays.
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings and a multiplier of 2.
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            use_jitter: false,
        }
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Enable ±25% jitter on computed delays.
    ///
    /// # Examples
    ///
    /// ```
    /// use gh_app_token_core::client::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default().with_jitter();
    /// assert!(policy.use_jitter);
    /// ```
    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.use_jitter = true;
        self
    }

    /// Disable jitter for deterministic delays.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Delay before retry number `retry` (1-based). Retry 0 has no delay.
    ///
    /// # Examples
    ///
    /// ```
    /// use gh_app_token_core::client::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.calculate_delay(1), Duration::from_secs(1));
    /// assert_eq!(policy.calculate_delay(2), Duration::from_secs(2));
    /// ```
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.powi(retry as i32 - 1);
        let delay_ms = (self.initial_delay.as_millis() as f64 * multiplier) as u64;
        let mut delay = Duration::from_millis(delay_ms);

        if delay > self.max_delay {
            delay = self.max_delay;
        }

        if self.use_jitter {
            use rand::Rng;
            let jitter_factor = rand::thread_rng().gen_range(0.75..=1.25);
            delay = Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64);
        }

        delay
    }

    /// Delay before retry number `retry`, preferring a server-requested wait.
    ///
    /// A `Retry-After` value replaces the computed backoff but is still capped
    /// at `max_delay`.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(requested) => requested.min(self.max_delay),
            None => self.calculate_delay(retry),
        }
    }

    /// Check if another attempt is allowed after `attempts_made` attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
