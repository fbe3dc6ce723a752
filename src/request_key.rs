//! Logical request keys used for deduplication and throttling.

use crate::error::{FetchError, Result};
use serde::Serialize;
use std::fmt;

/// Identifies one logical operation together with its parameters,
/// e.g. `getProducts` or `getProduct-42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    /// Key for an operation without parameters
    pub fn new(operation: impl Into<String>) -> Self {
        Self(operation.into())
    }

    /// Key for an operation with a single scalar parameter
    pub fn with_param(operation: &str, param: impl fmt::Display) -> Self {
        Self(format!("{}-{}", operation, param))
    }

    /// Key for an operation parameterised by a structured value, serialized
    /// as compact JSON so equal parameters always produce equal keys
    pub fn with_json<P: Serialize>(operation: &str, params: &P) -> Result<Self> {
        let encoded = serde_json::to_string(params)
            .map_err(|e| FetchError::InvalidRequest(format!("Unserializable key parameters: {}", e)))?;
        Ok(Self(format!("{}-{}", operation, encoded)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Operation name without parameters
    pub fn operation(&self) -> &str {
        self.0.split_once('-').map(|(op, _)| op).unwrap_or(&self.0)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
