//! In-flight request registry keyed by logical request.
//!
//! Each entry owns a spawned task; every caller asking for the same key
//! while the task runs receives a clone of one shared future. Entries leave
//! the registry the moment their task settles, so this is a correctness
//! cache for deduplication rather than a data cache.

use crate::error::{FetchError, Result};
use crate::request_key::RequestKey;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Future handed to every caller of one in-flight request
pub type SharedRequest<T> = Shared<BoxFuture<'static, Result<T>>>;

struct InFlightEntry<T> {
    id: Uuid,
    future: SharedRequest<T>,
    started_at: Instant,
}

pub struct RequestKeyCache<T> {
    entries: Arc<Mutex<HashMap<RequestKey, InFlightEntry<T>>>>,
}

impl<T> Clone for RequestKeyCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for RequestKeyCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestKeyCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Shared future for `key` if a request is currently in flight
    pub fn get(&self, key: &RequestKey) -> Option<SharedRequest<T>> {
        self.lock().get(key).map(|entry| entry.future.clone())
    }

    /// Return the in-flight future for `key`, or start one from `factory`.
    ///
    /// `factory` is only invoked when nothing is in flight. The entry is
    /// removed as soon as the produced future settles, whatever its outcome.
    pub fn get_or_create<F, Fut>(&self, key: &RequestKey, factory: F) -> SharedRequest<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut entries = self.lock();
        if let Some(entry) = entries.get(key) {
            debug!(key = %key, entry_id = %entry.id, "Joining in-flight request");
            return entry.future.clone();
        }
        self.register(&mut entries, key, move |_| factory())
    }

    /// Start a new request for `key` even if one is already in flight.
    ///
    /// The displaced request keeps running for its existing callers but no
    /// longer owns the key, so its settlement cannot evict the new entry.
    pub fn replace<F, Fut>(&self, key: &RequestKey, factory: F) -> SharedRequest<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut entries = self.lock();
        self.register(&mut entries, key, move |_| factory())
    }

    /// Register a request unconditionally. The body receives the entry id
    /// so it can evict the entry itself before its result is published; the
    /// entry is evicted anyway once the body finishes or panics.
    pub(crate) fn register_with<F, Fut>(&self, key: &RequestKey, body: F) -> SharedRequest<T>
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut entries = self.lock();
        self.register(&mut entries, key, body)
    }

    /// Remove the entry for `key` if it is still the one identified by `id`.
    /// Returns whether the entry was removed.
    pub fn evict(&self, key: &RequestKey, id: Uuid) -> bool {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.id == id => {
                let entry = entries.remove(key);
                if let Some(entry) = entry {
                    debug!(
                        key = %key,
                        entry_id = %id,
                        elapsed_ms = entry.started_at.elapsed().as_millis() as u64,
                        "Evicted settled request"
                    );
                }
                true
            }
            _ => false,
        }
    }

    /// When the current in-flight request for `key` started
    pub fn started_at(&self, key: &RequestKey) -> Option<Instant> {
        self.lock().get(key).map(|entry| entry.started_at)
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget every in-flight entry. Running tasks finish for their callers
    /// but can no longer evict anything.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn register<F, Fut>(
        &self,
        entries: &mut HashMap<RequestKey, InFlightEntry<T>>,
        key: &RequestKey,
        body: F,
    ) -> SharedRequest<T>
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        // Built before anything is inserted so a panicking factory leaves no entry.
        let task = body(id);
        let guard = EvictOnSettle {
            cache: self.clone(),
            key: key.clone(),
            id,
        };
        let handle = tokio::spawn(async move {
            let _guard = guard;
            task.await
        });
        let future: SharedRequest<T> = async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(FetchError::from(join_err)),
            }
        }
        .boxed()
        .shared();

        debug!(key = %key, entry_id = %id, "Registered in-flight request");
        entries.insert(
            key.clone(),
            InFlightEntry {
                id,
                future: future.clone(),
                started_at: Instant::now(),
            },
        );
        future
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestKey, InFlightEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Evicts its entry when the owning task finishes, including by panic
struct EvictOnSettle<T>
where
    T: Clone + Send + Sync + 'static,
{
    cache: RequestKeyCache<T>,
    key: RequestKey,
    id: Uuid,
}

impl<T> Drop for EvictOnSettle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cache.evict(&self.key, self.id);
    }
}
