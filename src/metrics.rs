use crate::request_key::RequestKey;
use crate::throttler::Decision;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub total_requests: u64,
    pub dispatched: u64,
    pub joined: u64,
    pub served_fresh: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    pub last_reset: u64,
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            dispatched: 0,
            joined: 0,
            served_fresh: 0,
            succeeded: 0,
            failed: 0,
            retries: 0,
            last_reset: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// Per-key counters of how requests were served
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    key_metrics: Arc<RwLock<HashMap<RequestKey, RequestMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, key: &RequestKey, decision: Decision) {
        let mut metrics = self.key_metrics.write().unwrap_or_else(PoisonError::into_inner);
        let entry = metrics.entry(key.clone()).or_default();

        entry.total_requests += 1;
        match decision {
            Decision::Dispatch => entry.dispatched += 1,
            Decision::JoinInFlight => entry.joined += 1,
            Decision::ServeFresh => entry.served_fresh += 1,
        }
    }

    pub fn record_settled(&self, key: &RequestKey, succeeded: bool, retries: u32) {
        let mut metrics = self.key_metrics.write().unwrap_or_else(PoisonError::into_inner);
        let entry = metrics.entry(key.clone()).or_default();

        if succeeded {
            entry.succeeded += 1;
        } else {
            entry.failed += 1;
        }
        entry.retries += u64::from(retries);
    }

    pub fn get_key_metrics(&self, key: &RequestKey) -> Option<RequestMetrics> {
        let metrics = self.key_metrics.read().unwrap_or_else(PoisonError::into_inner);
        metrics.get(key).cloned()
    }

    pub fn get_all_metrics(&self) -> HashMap<RequestKey, RequestMetrics> {
        let metrics = self.key_metrics.read().unwrap_or_else(PoisonError::into_inner);
        metrics.clone()
    }

    pub fn reset_key_metrics(&self, key: &RequestKey) {
        let mut metrics = self.key_metrics.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(key_metrics) = metrics.get_mut(key) {
            *key_metrics = RequestMetrics::default();
        }
    }

    pub fn get_global_metrics(&self) -> RequestMetrics {
        let metrics = self.key_metrics.read().unwrap_or_else(PoisonError::into_inner);
        let mut global = RequestMetrics::default();

        for key_metrics in metrics.values() {
            global.total_requests += key_metrics.total_requests;
            global.dispatched += key_metrics.dispatched;
            global.joined += key_metrics.joined;
            global.served_fresh += key_metrics.served_fresh;
            global.succeeded += key_metrics.succeeded;
            global.failed += key_metrics.failed;
            global.retries += key_metrics.retries;
        }

        global
    }
}
