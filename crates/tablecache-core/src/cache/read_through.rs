//! Offline-first read path.
//!
//! A cached value is returned immediately and refreshed in the background;
//! only a cold read waits on the network.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::store::{Collection, DurableStore};
use crate::api::{with_timeout, RemoteEndpoint, RemoteError, Resource};
use crate::error::{SyncError, SyncResult};

/// Where a value handed to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from the durable store; a refresh was scheduled
    Cached,
    /// Fetched from the remote because nothing was cached
    Network,
}

#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub source: Source,
    /// When the cached copy was written (cached reads only)
    pub cached_at: Option<DateTime<Utc>>,
}

impl<T> Fetched<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: f(self.value),
            source: self.source,
            cached_at: self.cached_at,
        }
    }
}

/// The remote call that produces the value for a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRequest {
    Collection(Resource),
    ById(Resource, u64),
    ByParent(Resource, u64),
}

impl RemoteRequest {
    async fn execute(&self, remote: &dyn RemoteEndpoint) -> Result<Value, RemoteError> {
        match *self {
            RemoteRequest::Collection(resource) => remote.read_collection(resource).await,
            RemoteRequest::ById(resource, id) => remote.read_by_id(resource, id).await,
            RemoteRequest::ByParent(resource, parent) => {
                remote.read_by_parent(resource, parent).await
            }
        }
    }
}

type Validator = fn(&Value) -> Result<(), String>;

fn validate_as<T: DeserializeOwned>(value: &Value) -> Result<(), String> {
    T::deserialize(value).map(|_| ()).map_err(|e| e.to_string())
}

/// Read-through cache over a durable store and a remote endpoint.
pub struct ReadThroughCache {
    store: Arc<dyn DurableStore>,
    remote: Arc<dyn RemoteEndpoint>,
    timeout: Duration,
    refreshes: Mutex<JoinSet<()>>,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn DurableStore>, remote: Arc<dyn RemoteEndpoint>, timeout: Duration) -> Self {
        Self {
            store,
            remote,
            timeout,
            refreshes: Mutex::new(JoinSet::new()),
        }
    }

    /// Return the value for `(collection, key)`.
    ///
    /// 1. Cached and decodable: returned at once, refresh runs in the background
    /// 2. Not cached: fetched from the remote, stored, returned
    /// 3. Not cached and the remote fails: `DataUnavailable`
    ///
    /// Store failures are treated as a cache miss.
    pub async fn fetch<T>(
        &self,
        collection: Collection,
        key: &str,
        request: RemoteRequest,
    ) -> SyncResult<Fetched<T>>
    where
        T: DeserializeOwned,
    {
        match self.store.get(collection, key) {
            Ok(Some(cached)) => match T::deserialize(&cached.data) {
                Ok(value) => {
                    debug!(collection = collection.as_str(), key, "Serving cached value");
                    self.spawn_refresh(collection, key, request, validate_as::<T>);
                    return Ok(Fetched {
                        value,
                        source: Source::Cached,
                        cached_at: Some(cached.cached_at),
                    });
                }
                Err(e) => {
                    warn!(collection = collection.as_str(), key, error = %e, "Cached value no longer matches schema, ignoring");
                }
            },
            Ok(None) => {
                debug!(collection = collection.as_str(), key, "Cache miss");
            }
            Err(e) => {
                warn!(collection = collection.as_str(), key, error = %e, "Store read failed, falling back to network");
            }
        }

        let value = self
            .fetch_remote(collection, key, request, validate_as::<T>)
            .await
            .map_err(|e| SyncError::DataUnavailable(e.to_string()))?;

        let value = T::deserialize(&value).map_err(|e| SyncError::InvalidPayload(e.to_string()))?;
        Ok(Fetched {
            value,
            source: Source::Network,
            cached_at: None,
        })
    }

    /// Fetch `(collection, key)` from the remote now and overwrite the cache.
    /// Unlike the background path, failures are returned to the caller.
    pub async fn refresh<T>(&self, collection: Collection, key: &str, request: RemoteRequest) -> SyncResult<()>
    where
        T: DeserializeOwned,
    {
        self.fetch_remote(collection, key, request, validate_as::<T>)
            .await
            .map(|_| ())
    }

    /// Wait for every scheduled background refresh to finish.
    pub async fn settle(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.lock_refreshes());
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background refresh task failed");
                }
            }
        }
    }

    fn lock_refreshes(&self) -> MutexGuard<'_, JoinSet<()>> {
        // The set stays usable even if a holder panicked
        self.refreshes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_refresh(&self, collection: Collection, key: &str, request: RemoteRequest, validate: Validator) {
        let store = Arc::clone(&self.store);
        let remote = Arc::clone(&self.remote);
        let timeout = self.timeout;
        let key = key.to_string();

        let mut refreshes = self.lock_refreshes();
        while refreshes.try_join_next().is_some() {}
        refreshes.spawn(async move {
            let result = refresh_entry(
                store.as_ref(),
                remote.as_ref(),
                timeout,
                collection,
                &key,
                request,
                validate,
            )
            .await;
            if let Err(e) = result {
                debug!(collection = collection.as_str(), key = %key, error = %e, "Background refresh failed, keeping cached value");
            }
        });
    }

    async fn fetch_remote(
        &self,
        collection: Collection,
        key: &str,
        request: RemoteRequest,
        validate: Validator,
    ) -> SyncResult<Value> {
        refresh_entry(
            self.store.as_ref(),
            self.remote.as_ref(),
            self.timeout,
            collection,
            key,
            request,
            validate,
        )
        .await
    }
}

/// Fetch, validate and store one entry. The store is only rewritten when the
/// value actually changed and no other writer stored the entry after this
/// fetch started; a failed store write is logged and the fresh value is still
/// returned.
async fn refresh_entry(
    store: &dyn DurableStore,
    remote: &dyn RemoteEndpoint,
    timeout: Duration,
    collection: Collection,
    key: &str,
    request: RemoteRequest,
    validate: Validator,
) -> SyncResult<Value> {
    let started = Utc::now();
    let value = with_timeout(timeout, request.execute(remote)).await?;
    validate(&value).map_err(SyncError::InvalidPayload)?;

    match store.get(collection, key) {
        Ok(Some(cached)) if cached.data == value => {
            debug!(collection = collection.as_str(), key, "Remote value unchanged");
        }
        Ok(Some(cached)) if cached.cached_at > started => {
            debug!(collection = collection.as_str(), key, "Entry stored while fetching, keeping the newer value");
        }
        _ => {
            if let Err(e) = store.put(collection, key, &value) {
                warn!(collection = collection.as_str(), key, error = %e, "Failed to cache fetched value");
            }
        }
    }

    Ok(value)
}
