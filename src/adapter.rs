//! Glue between a reducer store and the throttled backend.

use crate::backend::{take_field, Backend};
use crate::error::{FetchError, Result};
use crate::request_key::RequestKey;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{Reducer, Store};
use crate::throttler::Throttler;
use futures::future::{BoxFuture, FutureExt};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// One REST call and the part of its response a resource cares about
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub path: &'static str,
    pub body: Option<Value>,
    pub field: Option<&'static str>,
}

impl BackendRequest {
    pub fn get(path: &'static str) -> Self {
        Self {
            method: Method::GET,
            path,
            body: None,
            field: None,
        }
    }

    pub fn post(path: &'static str, body: Value) -> Self {
        Self {
            method: Method::POST,
            path,
            body: Some(body),
            field: None,
        }
    }

    /// Only decode `field` of the response object
    pub fn field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }

    async fn send(&self, backend: &dyn Backend) -> Result<Value> {
        backend.call(self.method.clone(), self.path, self.body.clone()).await
    }

    /// One attempt: call the backend and keep only the part of the response
    /// that decodes as `T`. A payload of the wrong shape fails the attempt.
    async fn resolve<T: DeserializeOwned>(&self, backend: &dyn Backend) -> Result<Value> {
        let payload = self.send(backend).await?;
        let payload = match self.field {
            Some(field) => take_field(payload, field)?,
            None => payload,
        };
        T::deserialize(&payload)?;
        Ok(payload)
    }
}

/// Runs backend calls for one store, reporting loading, success and error
/// transitions into it
pub struct StoreAdapter<R: Reducer> {
    store: Store<R>,
    throttler: Arc<Throttler<Value>>,
    backend: Arc<dyn Backend>,
}

impl<R: Reducer> StoreAdapter<R> {
    pub fn new(store: Store<R>, throttler: Arc<Throttler<Value>>, backend: Arc<dyn Backend>) -> Self {
        Self {
            store,
            throttler,
            backend,
        }
    }

    pub fn store(&self) -> &Store<R> {
        &self.store
    }

    pub fn throttler(&self) -> &Arc<Throttler<Value>> {
        &self.throttler
    }

    /// Deduplicated, throttled and retried read.
    ///
    /// The loading flag is raised before this returns. The outcome is
    /// reported to the store as `on_success(value)` or an error whether or
    /// not the returned future is polled. Must be called within a tokio
    /// runtime.
    pub fn fetch<T, S>(
        &self,
        resource: R::Resource,
        key: RequestKey,
        request: BackendRequest,
        force_refresh: bool,
        on_success: S,
    ) -> BoxFuture<'static, Result<T>>
    where
        T: DeserializeOwned + Clone + Send + 'static,
        S: FnOnce(T) -> R::Action + Send + 'static,
    {
        self.store.dispatch(R::set_loading(resource, true));

        let request = Arc::new(request);
        let backend = Arc::clone(&self.backend);
        let pending = self.throttler.throttled_request(
            &key,
            move || {
                let backend = Arc::clone(&backend);
                let request = Arc::clone(&request);
                async move { request.resolve::<T>(backend.as_ref()).await }
            },
            force_refresh,
        );

        let store = self.store.clone();
        report(tokio::spawn(async move {
            let outcome = pending.await.and_then(decode::<T>);
            settle(&store, resource, outcome, on_success)
        }))
    }

    /// Write that bypasses deduplication and throttling, retried according
    /// to `policy`
    pub fn mutate<T, S>(
        &self,
        resource: R::Resource,
        request: BackendRequest,
        policy: RetryPolicy,
        on_success: S,
    ) -> BoxFuture<'static, Result<T>>
    where
        T: DeserializeOwned + Clone + Send + 'static,
        S: FnOnce(T) -> R::Action + Send + 'static,
    {
        self.store.dispatch(R::set_loading(resource, true));

        let backend = Arc::clone(&self.backend);
        let store = self.store.clone();
        report(tokio::spawn(async move {
            let outcome = with_retry(&policy, || request.resolve::<T>(backend.as_ref()))
                .await
                .and_then(decode::<T>);
            settle(&store, resource, outcome, on_success)
        }))
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T> {
    Ok(serde_json::from_value(payload)?)
}

/// The store is updated by the spawned task, so a caller dropping this
/// future loses only the value, never the reducer update.
fn report<T: Send + 'static>(settled: JoinHandle<Result<T>>) -> BoxFuture<'static, Result<T>> {
    async move {
        match settled.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(FetchError::from(join_err)),
        }
    }
    .boxed()
}

fn settle<R, T, S>(store: &Store<R>, resource: R::Resource, outcome: Result<T>, on_success: S) -> Result<T>
where
    R: Reducer,
    T: Clone,
    S: FnOnce(T) -> R::Action,
{
    match outcome {
        Ok(value) => {
            store.dispatch(on_success(value.clone()));
            Ok(value)
        }
        Err(err) => {
            warn!(?resource, error = %err, "Request failed");
            store.dispatch(R::has_error(err.clone()));
            store.dispatch(R::set_loading(resource, false));
            Err(err)
        }
    }
}

/// Immediate failure for requests that cannot even be described, e.g.
/// parameters that do not serialize into a key
pub(crate) fn rejected<T: Send + 'static>(err: FetchError) -> BoxFuture<'static, Result<T>> {
    futures::future::ready(Err(err)).boxed()
}
