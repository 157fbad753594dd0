//! Bounded sleep-and-retry for transient source errors

use std::thread;
use std::time::Duration;

use super::errors::{SourceError, SourceResult};

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no sleeping.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `on_retry` sees the attempt number (1-based) and the error before
    /// each sleep. The sleep is always `delay`, whatever the source hints.
    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> SourceResult<T>,
        mut on_retry: impl FnMut(u32, &SourceError),
    ) -> SourceResult<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    on_retry(attempt, &e);
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let mut calls = 0;
        let mut retries = Vec::new();

        let result = policy.run(
            || {
                calls += 1;
                if calls < 3 {
                    Err(SourceError::RateLimited { retry_after: None })
                } else {
                    Ok(calls)
                }
            },
            |attempt, _| retries.push(attempt),
        );

        assert_eq!(result.unwrap(), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let mut calls = 0;

        let result: SourceResult<()> = policy.run(
            || {
                calls += 1;
                Err(SourceError::Unavailable("down".into()))
            },
            |_, _| {},
        );

        assert!(matches!(result, Err(SourceError::Unavailable(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_permanent_error_not_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut calls = 0;

        let result: SourceResult<()> = policy.run(
            || {
                calls += 1;
                Err(SourceError::InvalidUri("bad".into()))
            },
            |_, _| {},
        );

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
