use crate::error::FetchError;
use crate::throttle_config::ThrottleConfig;
use envconfig::Envconfig;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Base URL of the REST backend
    #[envconfig(from = "BACKEND_URL", default = "http://127.0.0.1:3000")]
    pub backend_url: String,

    /// Minimum time between dispatches for the same request key
    #[envconfig(from = "THROTTLE_WINDOW_MS", default = "1000")]
    pub throttle_window_ms: u64,

    /// Total attempts per dispatch
    #[envconfig(from = "MAX_ATTEMPTS", default = "3")]
    pub max_attempts: u32,

    /// Delay before the first retry, doubled for each further retry
    #[envconfig(from = "RETRY_BASE_DELAY_MS", default = "1000")]
    pub retry_base_delay_ms: u64,

    /// Per-call HTTP timeout
    #[envconfig(from = "REQUEST_TIMEOUT_SECS", default = "30")]
    pub request_timeout_secs: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig::new(
            Duration::from_millis(self.throttle_window_ms),
            self.max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            return Err(FetchError::Config(
                "BACKEND_URL must start with 'http://' or 'https://'".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(FetchError::Config(
                "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(FetchError::Config(format!(
                "Invalid LOG_LEVEL '{}'. Must be one of: {:?}",
                self.log_level, valid_levels
            )));
        }
        self.throttle_config().validate()?;
        Ok(())
    }
}
