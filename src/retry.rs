//! Bounded exponential backoff around a single fallible attempt.

use crate::error::{FetchError, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::throttle_config::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};

type RetryPredicate = Arc<dyn Fn(&FetchError) -> bool + Send + Sync>;

/// How many times an attempt is made and how long to wait in between.
///
/// The delay before retry `n` (0-indexed) is `base_delay * 2^n`, with no
/// jitter and no cap beyond the geometric series.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    is_retryable: RetryPredicate,
}

impl RetryPolicy {
    /// Policy retrying every failure
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            is_retryable: Arc::new(|_| true),
        }
    }

    /// Single attempt, failures surface immediately
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Replace the predicate deciding whether a failure deserves another attempt
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&FetchError) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(predicate);
        self
    }

    /// Only retry transport failures, timeouts, rate limiting and 5xx
    pub fn transient_only(self) -> Self {
        self.with_predicate(FetchError::is_transient)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn should_retry(&self, err: &FetchError) -> bool {
        (self.is_retryable)(err)
    }

    /// Delay inserted after failed attempt `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

/// Run `attempt_fn` until it succeeds, the attempt budget is spent, or the
/// policy declares the error permanent. The last error is returned as is.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut attempt_fn: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match attempt_fn().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "Attempt succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let exhausted = attempt + 1 >= policy.max_attempts;
                if exhausted || !policy.should_retry(&err) {
                    if !exhausted {
                        debug!(error = %err, "Error is not retryable");
                    }
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(10),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    fn failure() -> FetchError {
        FetchError::Transport("connection refused".into())
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(
            policy.delay_for_attempt(200),
            Duration::from_secs(u64::from(u32::MAX))
        );
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_calls_exactly_max_attempts() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let policy = RetryPolicy::default();

        let recorded = calls.clone();
        let result: Result<u32> = with_retry(&policy, || {
            recorded.lock().unwrap().push(Instant::now());
            async { Err(failure()) }
        })
        .await;

        assert_eq!(result, Err(failure()));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_close(calls[1] - calls[0], Duration::from_millis(1000));
        assert_close(calls[2] - calls[1], Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_third_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let counter = attempts.clone();
        let result = with_retry(&policy, || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(failure())
                } else {
                    Ok(n * 10)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(30));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default().transient_only();
        let started = Instant::now();

        let counter = attempts.clone();
        let result: Result<()> = with_retry(&policy, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::Status {
                    code: 422,
                    message: "invalid filter".into(),
                })
            }
        })
        .await;

        tokio_test::assert_err!(&result);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_policy_single_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<()> = with_retry(&RetryPolicy::no_retry(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(failure()) }
        })
        .await;

        assert_eq!(result, Err(failure()));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
