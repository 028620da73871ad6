use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// Key under which the whole restaurant list is cached.
pub const ALL_KEY: &str = "all";

/// Reserved key holding the pending-writes sequence.
pub const OUTBOX_KEY: &str = "outbox";

/// Logical partitions of the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Restaurant entities, keyed by id or [`ALL_KEY`]
    Restaurants,
    /// Reviews, keyed by parent restaurant id
    Reviews,
    /// Queued writes under [`OUTBOX_KEY`]
    PendingWrites,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Restaurants,
        Collection::Reviews,
        Collection::PendingWrites,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Restaurants => "restaurants",
            Collection::Reviews => "reviews",
            Collection::PendingWrites => "pending_writes",
        }
    }

    /// Whether the collection only holds data that can be re-fetched.
    pub fn is_cache(&self) -> bool {
        !matches!(self, Collection::PendingWrites)
    }
}

/// A stored value together with the time it was last written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Clock skew lands here too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Local persistent key-value store with named collections.
///
/// Implementations must make `put` atomic per key: a reader sees either the
/// previous value or the new one, never a partial write.
pub trait DurableStore: Send + Sync {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<CachedData<Value>>, StoreError>;

    fn put(&self, collection: Collection, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// In-process store. Nothing survives the process; used for tests and
/// ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(Collection, String), CachedData<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(Collection, String), CachedData<Value>>>, StoreError>
    {
        self.entries.lock().map_err(|e| StoreError::Unavailable {
            path: PathBuf::from(":memory:"),
            reason: format!("lock poisoned: {}", e),
        })
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<CachedData<Value>>, StoreError> {
        Ok(self.lock()?.get(&(collection, key.to_string())).cloned())
    }

    fn put(&self, collection: Collection, key: &str, value: &Value) -> Result<(), StoreError> {
        self.lock()?
            .insert((collection, key.to_string()), CachedData::new(value.clone()));
        Ok(())
    }
}

/// Store that could not be opened. Every operation fails, which pushes reads
/// onto the network-only path and makes queued writes report failure.
pub struct UnavailableStore {
    path: PathBuf,
    reason: String,
}

impl UnavailableStore {
    pub fn new(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            path,
            reason: reason.into(),
        }
    }

    fn error(&self) -> StoreError {
        StoreError::Unavailable {
            path: self.path.clone(),
            reason: self.reason.clone(),
        }
    }
}

impl DurableStore for UnavailableStore {
    fn get(&self, _collection: Collection, _key: &str) -> Result<Option<CachedData<Value>>, StoreError> {
        Err(self.error())
    }

    fn put(&self, _collection: Collection, _key: &str, _value: &Value) -> Result<(), StoreError> {
        Err(self.error())
    }
}
