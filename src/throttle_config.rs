use crate::error::{FetchError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Tuning for deduplication, throttling and retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Minimum time between two dispatches for the same key. A zero window
    /// disables serving settled results.
    #[serde(with = "humantime_serde")]
    pub throttle_window: Duration,

    /// Total attempts per dispatch, including the first one
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles for each further retry
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "validate_positive_duration"))]
    pub base_delay: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl ThrottleConfig {
    pub fn new(throttle_window: Duration, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            throttle_window,
            max_attempts,
            base_delay,
        }
    }

    /// Parse and validate a JSON document such as
    /// `{"throttle_window": "1s", "max_attempts": 3, "base_delay": "500ms"}`
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: ThrottleConfig =
            serde_json::from_str(raw).map_err(|e| FetchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retry policy derived from this configuration, retrying every failure
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_delay)
    }
}

fn validate_positive_duration(value: &Duration) -> std::result::Result<(), ValidationError> {
    if value.is_zero() {
        return Err(ValidationError::new("zero_duration"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ThrottleConfig::default();
        assert_eq!(config.throttle_window, Duration::from_secs(1));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_with_humantime_durations() {
        let config = ThrottleConfig::from_json(
            r#"{"throttle_window": "250ms", "max_attempts": 5, "base_delay": "2s"}"#,
        )
        .unwrap();
        assert_eq!(config.throttle_window, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ThrottleConfig::from_json(r#"{"max_attempts": 1}"#).unwrap();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.throttle_window, DEFAULT_THROTTLE_WINDOW);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ThrottleConfig::from_json(r#"{"max_attempts": 0}"#).is_err());
        assert!(ThrottleConfig::from_json(r#"{"max_attempts": 11}"#).is_err());
        assert!(ThrottleConfig::from_json(r#"{"base_delay": "0s"}"#).is_err());
        assert!(ThrottleConfig::from_json(r#"{"throttle_window": "soon"}"#).is_err());
    }

    #[test]
    fn test_retry_policy_mirrors_config() {
        let config = ThrottleConfig::new(Duration::ZERO, 4, Duration::from_millis(100));
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
    }
}
