//! Bounded exponential backoff for the stage poll loop.

use std::time::Duration;

use crate::error::ErrorCategory;

/// Configuration for retry behavior with exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryStrategy {
    /// Base delay for the first retry attempt.
    pub base_delay: Duration,
    /// Maximum delay cap for any retry attempt.
    pub max_delay: Duration,
    /// Maximum number of consecutive retries before the session fails.
    pub max_attempts: u32,
    /// Percentage of jitter to add to delays (0-100).
    pub jitter_percent: u8,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter_percent: 10,
        }
    }
}

impl RetryStrategy {
    /// Creates a new retry strategy with the specified parameters.
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
        jitter_percent: u8,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            jitter_percent: jitter_percent.min(100),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`, then shifted by a
    /// deterministic jitter of at most `jitter_percent`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.base_delay;
        }

        let exponent = (attempt - 1).min(31);
        let multiplier = 1u64 << exponent;
        let base_millis = self.base_delay.as_millis() as u64;
        let delay_millis = base_millis.saturating_mul(multiplier);
        let capped_millis = delay_millis.min(self.max_delay.as_millis() as u64);

        let jitter_range = (capped_millis as f64 * self.jitter_percent as f64) / 100.0;
        let jitter = deterministic_jitter(attempt, jitter_range);

        let final_millis = (capped_millis as i64 + jitter).max(0) as u64;
        Duration::from_millis(final_millis)
    }

    /// Whether another retry is allowed after `attempt` failures of `category`.
    pub fn should_retry(&self, attempt: u32, category: &ErrorCategory) -> bool {
        category.is_retryable() && attempt < self.max_attempts
    }
}

// Alternates sign per attempt so consecutive clients do not line up exactly.
fn deterministic_jitter(attempt: u32, jitter_range: f64) -> i64 {
    let sign = if attempt % 2 == 0 { 1.0 } else { -1.0 };
    let factor = ((attempt % 5) as f64 + 1.0) / 5.0;
    (jitter_range * sign * factor) as i64
}
