//! Retry policy with exponential backoff.

use reqwest::Method;
use std::time::Duration;

use crate::types::HttpClientConfig;

/// Read-style methods. Only these are retried.
pub fn is_retryable_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts for retryable methods, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier,
        }
    }

    pub fn from_config(config: &HttpClientConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff,
            config.backoff_multiplier,
        )
    }

    /// Attempts allowed for `method`.
    pub fn attempts_for(&self, method: &Method) -> u32 {
        if is_retryable_method(method) {
            self.max_attempts
        } else {
            1
        }
    }

    /// Wait after failed attempt `attempt` (1-indexed): `initial * multiplier^(attempt-1)`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.clamp(0.0, u64::MAX as f64) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_read_methods_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts_for(&Method::GET), 3);
        assert_eq!(policy.attempts_for(&Method::HEAD), 3);
        assert_eq!(policy.attempts_for(&Method::OPTIONS), 3);
        assert_eq!(policy.attempts_for(&Method::POST), 1);
        assert_eq!(policy.attempts_for(&Method::PUT), 1);
        assert_eq!(policy.attempts_for(&Method::DELETE), 1);
    }

    #[test]
    fn test_backoff_doubles_from_half_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10), 2.0);
        assert_eq!(policy.attempts_for(&Method::GET), 1);
    }
}
