pub mod adapter;
pub mod backend;
pub mod config;
pub mod contexts;
pub mod error;
pub mod metrics;
pub mod models;
pub mod request_cache;
pub mod request_key;
pub mod retry;
pub mod store;
pub mod throttle_config;
pub mod throttle_window;
pub mod throttler;

pub use adapter::{BackendRequest, StoreAdapter};
pub use backend::{Backend, HttpBackend};
pub use config::Config;
pub use error::{FetchError, Result};
pub use metrics::{MetricsCollector, RequestMetrics};
pub use request_cache::RequestKeyCache;
pub use request_key::RequestKey;
pub use retry::{with_retry, RetryPolicy};
pub use store::{Reducer, Store};
pub use throttle_config::ThrottleConfig;
pub use throttle_window::ThrottleWindowTracker;
pub use throttler::{Decision, Throttler};
