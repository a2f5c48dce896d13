//! Bounded retry with a fixed delay
//!
//! Re-runs a failing async operation a small, fixed number of times. The
//! delay between attempts is constant: callers that need to fall back to a
//! different endpoint do so once the retries are spent, so there is no
//! exponential growth to tune.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

/// Retry policy for a single operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Single attempt, never retried
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Short delay for tests and local services
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_millis(10),
        }
    }

    /// Builder: set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder: set delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Errors that know whether another attempt could help
pub trait RetryableError: std::fmt::Display {
    /// Whether this error should trigger a retry
    fn is_retryable(&self) -> bool;
}

/// Error returned when the operation did not succeed
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    #[error("non-retryable error on attempt {attempts}: {error}")]
    NonRetryable { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// Get the underlying error
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::NonRetryable { error, .. } => error,
        }
    }

    /// Borrow the underlying error
    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::NonRetryable { error, .. } => error,
        }
    }

    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::NonRetryable { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// What happened on one attempt, handed to the observer
#[derive(Debug)]
pub struct Attempt<'a, E> {
    /// 1-based attempt number
    pub number: u32,
    /// Wall time spent in the operation
    pub latency: Duration,
    /// The failure, if the attempt failed
    pub error: Option<&'a E>,
    /// Whether another attempt follows
    pub will_retry: bool,
}

impl<E> Attempt<'_, E> {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Executor that wraps operations with retry logic
#[derive(Clone, Debug, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute, reporting every attempt to `observe`
    ///
    /// The operation receives the 1-based attempt number. The observer runs
    /// after each attempt, before any delay.
    pub async fn execute_observed<F, Fut, T, E, O>(
        &self,
        context: &str,
        mut operation: F,
        mut observe: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError,
        O: FnMut(&Attempt<'_, E>),
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = Instant::now();
            let outcome = operation(attempt).await;
            let latency = started.elapsed();

            match outcome {
                Ok(value) => {
                    observe(&Attempt {
                        number: attempt,
                        latency,
                        error: None,
                        will_retry: false,
                    });
                    if attempt > 1 {
                        info!(context = %context, attempt, "Succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let retryable = error.is_retryable();
                    let will_retry = retryable && attempt <= self.policy.max_retries;

                    observe(&Attempt {
                        number: attempt,
                        latency,
                        error: Some(&error),
                        will_retry,
                    });

                    if !retryable {
                        return Err(RetryError::NonRetryable {
                            attempts: attempt,
                            error,
                        });
                    }
                    if !will_retry {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    debug!(
                        context = %context,
                        attempt,
                        max_retries = self.policy.max_retries,
                        error = %error,
                        wait_ms = self.policy.delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    sleep(self.policy.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("test error: {0}")]
    struct TestError(String, bool);

    impl RetryableError for TestError {
        fn is_retryable(&self) -> bool {
            self.1
        }
    }

    async fn run<F, Fut, T>(
        executor: &RetryExecutor,
        operation: F,
    ) -> Result<T, RetryError<TestError>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TestError>>,
    {
        executor
            .execute_observed("test", |_| operation(), |_| {})
            .await
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let executor = RetryExecutor::new(RetryPolicy::fast());

        let result: Result<i32, RetryError<TestError>> =
            run(&executor, || async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::fast());

        let result: Result<i32, RetryError<TestError>> = run(&executor, || {
            let c = counter_clone.clone();
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(TestError("transient".into(), true))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let executor = RetryExecutor::new(RetryPolicy::fast());

        let result: Result<i32, RetryError<TestError>> = run(&executor, || {
            let c = counter_clone.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TestError("permanent".into(), false))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::NonRetryable { attempts: 1, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_after_max_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(RetryPolicy::new(2, Duration::from_millis(5)));

        let result: Result<i32, RetryError<TestError>> = run(&executor, || {
            let c = counter_clone.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(TestError("always fails".into(), true))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fixed_delay_between_attempts() {
        let executor = RetryExecutor::new(RetryPolicy::new(2, Duration::from_millis(30)));
        let started = Instant::now();

        let _: Result<(), RetryError<TestError>> =
            run(&executor, || async { Err(TestError("down".into(), true)) }).await;

        // two pauses of 30ms, no growth
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_observer_sees_every_attempt() {
        let executor = RetryExecutor::new(RetryPolicy::fast());
        let mut seen = Vec::new();

        let result: Result<(), RetryError<TestError>> = executor
            .execute_observed(
                "observed",
                |n| async move {
                    if n < 2 {
                        Err(TestError("flaky".into(), true))
                    } else {
                        Ok(())
                    }
                },
                |attempt| seen.push((attempt.number, attempt.succeeded(), attempt.will_retry)),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(seen, vec![(1, false, true), (2, true, false)]);
    }

    #[test]
    fn test_policy_presets() {
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
        assert_eq!(
            RetryPolicy::default().with_delay(Duration::from_secs(1)).delay,
            Duration::from_secs(1)
        );
    }
}
