//! Bounded retry with exponential backoff.
//!
//! Wraps an arbitrary asynchronous operation with up to `max_attempts`
//! tries. Backoff between attempts is pure exponential with a ceiling,
//! no jitter. This is the only layer in the crate that swallows an error
//! and tries again; everything else propagates unchanged.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::QueryError;

/// Default maximum attempts per operation.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the second attempt.
const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
/// Default backoff ceiling.
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default backoff multiplier.
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Retry policy controlling attempt count, backoff, and which HTTP
/// statuses count as transient.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts, 1-indexed. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Ceiling applied to every computed delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// HTTP status codes retried when the error carries no explicit
    /// retryability classification.
    pub retryable_status_codes: HashSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            retryable_status_codes: [408, 429, 500, 502, 503, 504].into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Validates the policy bounds.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Configuration`] when any bound is out of range.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.max_attempts < 1 {
            return Err(QueryError::Configuration {
                message: "retry max_attempts must be at least 1".to_string(),
            });
        }
        if self.initial_delay.is_zero() {
            return Err(QueryError::Configuration {
                message: "retry initial_delay must be positive".to_string(),
            });
        }
        if self.max_delay < self.initial_delay {
            return Err(QueryError::Configuration {
                message: "retry max_delay must be >= initial_delay".to_string(),
            });
        }
        if self.backoff_multiplier < 1.0 {
            return Err(QueryError::Configuration {
                message: "retry backoff_multiplier must be >= 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Computes the delay inserted before attempt `attempt + 1`, where
    /// `attempt` is the 1-indexed attempt that just failed.
    ///
    /// `min(initial * multiplier^(attempt - 1), max_delay)`.
    #[must_use]
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.backoff_multiplier.powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let scaled = self.initial_delay.as_millis() as f64 * factor;
        if scaled >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(scaled as u64)
        }
    }

    /// Decides whether `error` warrants another attempt under this policy.
    ///
    /// Classification order: an error that explicitly marks itself
    /// retryable wins; otherwise an error carrying a status code is
    /// retried iff that code is in [`Self::retryable_status_codes`];
    /// unclassified errors default to retryable.
    #[must_use]
    pub fn is_retryable(&self, error: &QueryError) -> bool {
        if let QueryError::Agent {
            retryable: true, ..
        } = error
        {
            return true;
        }
        if let Some(explicit) = error.retryable_hint() {
            return explicit;
        }
        error
            .status()
            .is_none_or(|code| self.retryable_status_codes.contains(&code))
    }
}

/// Runs `operation` up to `policy.max_attempts` times with exponential
/// backoff between attempts.
///
/// On a non-retryable error, or once attempts are exhausted, the last
/// error is propagated unchanged.
///
/// # Errors
///
/// The final [`QueryError`] produced by `operation`.
pub async fn execute_with_retry<T, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
) -> Result<T, QueryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueryError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match operation().await {
            Ok(value) => {
                debug!(attempt, "operation succeeded");
                return Ok(value);
            }
            Err(error) => {
                if !policy.is_retryable(&error) {
                    warn!(attempt, %error, "non-retryable error, giving up");
                    return Err(error);
                }
                if attempt >= policy.max_attempts {
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        %error,
                        "retry attempts exhausted"
                    );
                    return Err(error);
                }
                let delay = policy.delay_after_attempt(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    use proptest::prelude::*;

    fn transient() -> QueryError {
        QueryError::Transport {
            message: "connection reset".to_string(),
        }
    }

    #[test]
    fn test_backoff_monotonic_and_clamped() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_millis(200));
        // 400ms clamps to the 350ms ceiling
        assert_eq!(policy.delay_after_attempt(3), Duration::from_millis(350));
        assert_eq!(policy.delay_after_attempt(10), Duration::from_millis(350));
    }

    #[test]
    fn test_status_code_classification() {
        let policy = RetryPolicy::default();
        let retryable = QueryError::Agent {
            message: "unavailable".to_string(),
            status: 503,
            retryable: false,
        };
        let fatal = QueryError::Agent {
            message: "not found".to_string(),
            status: 404,
            retryable: false,
        };
        assert!(policy.is_retryable(&retryable));
        assert!(!policy.is_retryable(&fatal));
    }

    #[test]
    fn test_explicit_flag_beats_status_set() {
        let policy = RetryPolicy {
            retryable_status_codes: HashSet::new(),
            ..RetryPolicy::default()
        };
        let flagged = QueryError::Agent {
            message: "try again".to_string(),
            status: 404,
            retryable: true,
        };
        assert!(policy.is_retryable(&flagged));
    }

    #[test]
    fn test_timeout_retried_via_408() {
        let policy = RetryPolicy::default();
        let err = QueryError::Timeout {
            elapsed: Duration::from_secs(1),
        };
        assert!(policy.is_retryable(&err));
    }

    #[test]
    fn test_validation_never_retried() {
        let policy = RetryPolicy::default();
        let err = QueryError::Validation {
            message: "empty query".to_string(),
        };
        assert!(!policy.is_retryable(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_calls_exactly_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), QueryError> = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            },
            &policy,
        )
        .await;
        assert!(matches!(result, Err(QueryError::Transport { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok("answer")
                    }
                }
            },
            &policy,
        )
        .await;
        assert_eq!(result.unwrap_or(""), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let policy = RetryPolicy {
            max_attempts: 5,
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), QueryError> = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(QueryError::Validation {
                        message: "bad payload".to_string(),
                    })
                }
            },
            &policy,
        )
        .await;
        assert!(matches!(result, Err(QueryError::Validation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_validate_bounds() {
        let mut policy = RetryPolicy::default();
        assert!(policy.validate().is_ok());

        policy.max_attempts = 0;
        assert!(policy.validate().is_err());

        policy = RetryPolicy {
            max_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());

        policy = RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    proptest! {
        /// Delays never exceed the ceiling and never shrink as attempts grow.
        #[test]
        fn prop_backoff_clamped_and_nondecreasing(
            initial_ms in 1u64..5_000,
            ceiling_extra_ms in 0u64..60_000,
            multiplier in 1.0f64..4.0,
            attempt in 1u32..20,
        ) {
            let policy = RetryPolicy {
                initial_delay: Duration::from_millis(initial_ms),
                max_delay: Duration::from_millis(initial_ms + ceiling_extra_ms),
                backoff_multiplier: multiplier,
                ..RetryPolicy::default()
            };
            let current = policy.delay_after_attempt(attempt);
            let next = policy.delay_after_attempt(attempt + 1);
            prop_assert!(current <= policy.max_delay);
            prop_assert!(current >= Duration::from_millis(0));
            prop_assert!(next >= current);
        }
    }
}
