//! Retry utility for transient failures
//!
//! Supports fixed-delay retries (the default for outbound API calls) and
//! capped exponential backoff with optional jitter.
//!
//! # Examples
//!
//! ```
//! use fanbase_core::retry::{retry_with_backoff, RetryPolicy};
//!
//! # async fn example() -> Result<(), String> {
//! let value = retry_with_backoff(
//!     "load-thing",
//!     || async { Ok::<_, String>(42) },
//!     &RetryPolicy::fixed(3, 5000),
//!     |_err: &String| true,
//! )
//! .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 means only the initial attempt)
    pub max_retries: u32,

    /// Delay in milliseconds before the first retry
    pub base_delay_ms: u64,

    /// Upper bound for the delay in milliseconds
    pub max_delay_ms: u64,

    /// Whether to add up to 30% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// 3 retries, 5 second fixed delay
    fn default() -> Self {
        Self::fixed(3, 5000)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64, jitter: bool) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            jitter,
        }
    }

    /// Same delay between every attempt, no jitter
    ///
    /// ```
    /// use fanbase_core::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::fixed(3, 250);
    /// assert_eq!(policy.delay_for(0).as_millis(), 250);
    /// assert_eq!(policy.delay_for(2).as_millis(), 250);
    /// ```
    pub fn fixed(max_retries: u32, delay_ms: u64) -> Self {
        Self::new(max_retries, delay_ms, delay_ms, false)
    }

    /// Delay before retry number `attempt` (0-indexed)
    ///
    /// `min(base * 2^attempt, max)`, plus up to 30% jitter when enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.jitter {
            let jitter_range = (capped_delay as f64 * 0.3) as u64;
            let jitter = if jitter_range > 0 {
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                nanos % (jitter_range + 1)
            } else {
                0
            };
            capped_delay.saturating_add(jitter)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay)
    }
}

/// Run `operation`, retrying while `is_retryable` accepts the error and the
/// policy still has attempts left
///
/// Returns the first success, the first non-retryable error, or the last
/// error once retries are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    operation_name: &str,
    mut operation: F,
    policy: &RetryPolicy,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        total_attempts = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt,
                        error = %error,
                        "Error is not retryable"
                    );
                    return Err(error);
                }

                if attempt >= policy.max_retries {
                    tracing::warn!(
                        operation = operation_name,
                        max_retries = policy.max_retries,
                        error = %error,
                        "All retry attempts exhausted"
                    );
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying after delay"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_policy_is_fixed() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay_for(0), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(5000));
    }

    #[test]
    fn test_exponential_progression_without_jitter() {
        let policy = RetryPolicy::new(5, 100, 10_000, false);
        assert_eq!(policy.delay_for(0).as_millis(), 100);
        assert_eq!(policy.delay_for(1).as_millis(), 200);
        assert_eq!(policy.delay_for(3).as_millis(), 800);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(10, 100, 500, false);
        assert_eq!(policy.delay_for(5).as_millis(), 500);
        assert_eq!(policy.delay_for(40).as_millis(), 500);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, 1000, 5000, true);
        let delay_ms = policy.delay_for(0).as_millis();
        assert!((1000..=1300).contains(&delay_ms));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = retry_with_backoff(
            "flaky",
            || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("temporary".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
            &RetryPolicy::fixed(3, 1000),
            |_: &String| true,
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: Result<(), String> = retry_with_backoff(
            "always-failing",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("still down".to_string())
                }
            },
            &RetryPolicy::fixed(2, 1000),
            |_: &String| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: Result<(), String> = retry_with_backoff(
            "bad-request",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("bad request".to_string())
                }
            },
            &RetryPolicy::fixed(5, 1000),
            |_: &String| false,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
