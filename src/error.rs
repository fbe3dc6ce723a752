use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by a backend fetch.
///
/// Every variant carries owned strings so a single settled result can be
/// cloned out to every caller sharing the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Backend returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Request task failed: {0}")]
    TaskFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    /// Whether the failure is worth another attempt: connection problems,
    /// request timeouts, rate limiting and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { code, .. } => *code == 408 || *code == 429 || (500..=599).contains(code),
            FetchError::Decode(_)
            | FetchError::InvalidRequest(_)
            | FetchError::TaskFailed(_)
            | FetchError::Config(_) => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Status {
                code: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => FetchError::Decode(err.to_string()),
            None => FetchError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(err: tokio::task::JoinError) -> Self {
        FetchError::TaskFailed(err.to_string())
    }
}

impl From<validator::ValidationErrors> for FetchError {
    fn from(err: validator::ValidationErrors) -> Self {
        FetchError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Transport("connection reset".into()).is_transient());
        assert!(FetchError::Status { code: 503, message: "unavailable".into() }.is_transient());
        assert!(FetchError::Status { code: 429, message: "slow down".into() }.is_transient());
        assert!(FetchError::Status { code: 408, message: "timeout".into() }.is_transient());
        assert!(!FetchError::Status { code: 404, message: "missing".into() }.is_transient());
        assert!(!FetchError::Status { code: 422, message: "invalid".into() }.is_transient());
        assert!(!FetchError::Decode("bad json".into()).is_transient());
    }

    #[test]
    fn test_error_serialization() {
        let err = FetchError::Status { code: 500, message: "boom".into() };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["detail"]["code"], 500);

        let err = FetchError::Transport("refused".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "transport");
        assert_eq!(json["detail"], "refused");
    }

    #[test]
    fn test_status_code() {
        let err = FetchError::Status { code: 404, message: "missing".into() };
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(FetchError::Transport("x".into()).status_code(), None);
    }
}
