use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::request_cache::{RequestKeyCache, SharedRequest};
use crate::request_key::RequestKey;
use crate::retry::{with_retry, RetryPolicy};
use crate::throttle_config::ThrottleConfig;
use crate::throttle_window::ThrottleWindowTracker;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::debug;
use validator::Validate;

/// How a call to [`Throttler::throttled_request`] is served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Call the backend
    Dispatch,
    /// Share the request already in flight for the key
    JoinInFlight,
    /// Reuse the value that settled within the throttle window
    ServeFresh,
}

impl Decision {
    /// Decision table over whether the caller forces a refresh, whether a
    /// request is in flight, and whether a successful result settled within
    /// the throttle window.
    pub fn decide(force_refresh: bool, in_flight: bool, fresh: bool) -> Self {
        match (force_refresh, in_flight, fresh) {
            (true, _, _) => Decision::Dispatch,
            (false, true, _) => Decision::JoinInFlight,
            (false, false, true) => Decision::ServeFresh,
            (false, false, false) => Decision::Dispatch,
        }
    }
}

struct WindowState<T> {
    tracker: ThrottleWindowTracker,
    fresh: HashMap<RequestKey, T>,
}

/// Deduplicating, throttling, retrying front for backend requests.
///
/// One instance is owned per store provider; clone the `Arc` to share it
/// between providers explicitly.
pub struct Throttler<T> {
    config: ThrottleConfig,
    retry_policy: RetryPolicy,
    cache: RequestKeyCache<T>,
    window: Arc<Mutex<WindowState<T>>>,
    metrics: MetricsCollector,
}

impl<T> Throttler<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a throttler retrying every failure as configured
    pub fn new(config: ThrottleConfig) -> Result<Self> {
        config.validate()?;
        let retry_policy = config.retry_policy();
        Ok(Self::with_retry_policy(config, retry_policy))
    }

    /// Create a throttler with a custom retry policy, e.g. one that skips
    /// permanent failures. The policy's attempts and delays take precedence
    /// over the ones in `config`.
    pub fn with_retry_policy(config: ThrottleConfig, retry_policy: RetryPolicy) -> Self {
        Self {
            config,
            retry_policy,
            cache: RequestKeyCache::new(),
            window: Arc::new(Mutex::new(WindowState {
                tracker: ThrottleWindowTracker::new(),
                fresh: HashMap::new(),
            })),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Serve `key` from the in-flight request, a fresh settled value, or a
    /// new retried call to `request_fn`.
    ///
    /// The decision is taken and any dispatch started before this returns,
    /// so callers in the same tick always coalesce. Must be called within a
    /// tokio runtime.
    pub fn throttled_request<F, Fut>(
        &self,
        key: &RequestKey,
        request_fn: F,
        force_refresh: bool,
    ) -> BoxFuture<'static, Result<T>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let now = Instant::now();
        let window = self.lock_window();

        let in_flight = self.cache.get(key);
        let fresh = if window
            .tracker
            .should_dispatch(key, now, self.config.throttle_window, false)
        {
            None
        } else {
            window.fresh.get(key).cloned()
        };

        let decision = Decision::decide(force_refresh, in_flight.is_some(), fresh.is_some());
        self.metrics.record_decision(key, decision);
        debug!(key = %key, ?decision, force_refresh, "Throttled request");

        match (decision, in_flight, fresh) {
            (Decision::JoinInFlight, Some(shared), _) => shared.boxed(),
            (Decision::ServeFresh, _, Some(value)) => future::ready(Ok(value)).boxed(),
            _ => self.dispatch(key, request_fn, now).boxed(),
        }
    }

    /// Forget in-flight requests, dispatch timestamps and fresh values.
    /// Requests already running still settle for their own callers.
    pub fn reset(&self) {
        let mut window = self.lock_window();
        self.cache.clear();
        window.tracker.clear();
        window.fresh.clear();
        debug!("Throttler state reset");
    }

    pub fn in_flight(&self) -> usize {
        self.cache.len()
    }

    pub fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.cache.contains(key)
    }

    pub fn last_dispatch(&self, key: &RequestKey) -> Option<Instant> {
        self.lock_window().tracker.last_dispatch(key)
    }

    fn dispatch<F, Fut>(
        &self,
        key: &RequestKey,
        request_fn: F,
        now: Instant,
    ) -> SharedRequest<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let policy = self.retry_policy.clone();
        let cache = self.cache.clone();
        let window = Arc::clone(&self.window);
        let metrics = self.metrics.clone();
        let owned_key = key.clone();

        self.cache.register_with(key, move |id| async move {
            let attempts = AtomicU32::new(0);
            let result = with_retry(&policy, || {
                attempts.fetch_add(1, Ordering::Relaxed);
                request_fn()
            })
            .await;

            let mut state = window.lock().unwrap_or_else(PoisonError::into_inner);
            if cache.evict(&owned_key, id) {
                state.tracker.record_dispatch(&owned_key, now);
                match &result {
                    Ok(value) => {
                        state.fresh.insert(owned_key.clone(), value.clone());
                    }
                    Err(_) => {
                        state.fresh.remove(&owned_key);
                    }
                }
            } else {
                debug!(key = %owned_key, "Settled request was superseded");
            }
            drop(state);

            let retries = attempts.load(Ordering::Relaxed).saturating_sub(1);
            metrics.record_settled(&owned_key, result.is_ok(), retries);
            result
        })
    }

    fn lock_window(&self) -> MutexGuard<'_, WindowState<T>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
