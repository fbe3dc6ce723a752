//! Backend collaborators answering REST calls with JSON payloads.

use crate::error::{FetchError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// A transport able to perform one REST call.
///
/// The orchestration layer retries calls, so implementations should treat
/// anything routed through a deduplicated action as idempotent.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value>;
}

/// [`Backend`] over HTTP against a fixed base URL
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(FetchError::Config(format!(
                "Backend URL must start with 'http://' or 'https://', got '{}'",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> Result<String> {
        if !path.starts_with('/') {
            return Err(FetchError::InvalidRequest(format!(
                "Path must start with '/', got '{}'",
                path
            )));
        }
        Ok(format!("{}{}", self.base_url, path))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.url_for(path)?;
        debug!(method = %method, url = %url, "Calling backend");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("").to_string());
            return Err(FetchError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Extract `field` from a payload object, e.g. `products` out of
/// `{"products": [...]}`
pub fn take_field(mut payload: Value, field: &str) -> Result<Value> {
    payload
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| FetchError::Decode(format!("Response is missing field '{}'", field)))
}
