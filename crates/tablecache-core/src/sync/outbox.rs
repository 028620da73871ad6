//! Durable queue of writes waiting for remote delivery.
//!
//! The whole queue lives under one reserved key as an ordered JSON array.
//! Entries are kept in submission order and delivered front first.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{RemoteEndpoint, RemoteError, Resource};
use crate::cache::{Collection, DurableStore, OUTBOX_KEY};
use crate::error::StoreError;
use crate::models::NewReview;

/// A write the user made that the remote has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingWrite {
    Review(NewReview),
    Favorite { restaurant_id: u64, is_favorite: bool },
}

/// Cache entries that go stale once a write is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Invalidation {
    /// Reviews cached for a restaurant
    Reviews(u64),
    /// A restaurant entity and the full restaurant list
    Restaurant(u64),
}

impl PendingWrite {
    /// Id of the restaurant the write belongs to.
    pub fn parent_id(&self) -> u64 {
        match self {
            PendingWrite::Review(review) => review.restaurant_id,
            PendingWrite::Favorite { restaurant_id, .. } => *restaurant_id,
        }
    }

    pub fn invalidation(&self) -> Invalidation {
        match self {
            PendingWrite::Review(review) => Invalidation::Reviews(review.restaurant_id),
            PendingWrite::Favorite { restaurant_id, .. } => Invalidation::Restaurant(*restaurant_id),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PendingWrite::Review(review) => format!(
                "review of restaurant {} by {} ({}/5)",
                review.restaurant_id, review.name, review.rating
            ),
            PendingWrite::Favorite {
                restaurant_id,
                is_favorite: true,
            } => format!("mark restaurant {} as favorite", restaurant_id),
            PendingWrite::Favorite { restaurant_id, .. } => {
                format!("unmark restaurant {} as favorite", restaurant_id)
            }
        }
    }

    /// Deliver the write.
    pub async fn send(&self, remote: &dyn RemoteEndpoint) -> Result<Value, RemoteError> {
        match self {
            PendingWrite::Review(review) => {
                let payload = serde_json::to_value(review)?;
                remote.write(Resource::Reviews, &payload).await
            }
            PendingWrite::Favorite {
                restaurant_id,
                is_favorite,
            } => {
                remote
                    .update(
                        Resource::Restaurants,
                        *restaurant_id,
                        &[("is_favorite", is_favorite.to_string())],
                    )
                    .await
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub write: PendingWrite,
    pub queued_at: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn new(write: PendingWrite) -> Self {
        Self {
            write,
            queued_at: Utc::now(),
        }
    }

    pub fn parent_id(&self) -> u64 {
        self.write.parent_id()
    }
}

/// Outbox persisted in the pending-writes collection.
///
/// Every mutation is a read-modify-write of the stored sequence under one
/// lock, so an `enqueue` racing a drain is never overwritten.
pub struct Outbox {
    store: Arc<dyn DurableStore>,
    lock: Mutex<()>,
}

impl Outbox {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        let Some(cached) = self.store.get(Collection::PendingWrites, OUTBOX_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_value(cached.data).map_err(|e| StoreError::Corrupt {
            collection: Collection::PendingWrites.as_str(),
            key: OUTBOX_KEY.to_string(),
            reason: e.to_string(),
        })
    }

    fn save(&self, entries: &[OutboxEntry]) -> Result<(), StoreError> {
        let value = serde_json::to_value(entries)?;
        self.store.put(Collection::PendingWrites, OUTBOX_KEY, &value)
    }

    /// Append a write and persist the queue before returning.
    /// Returns the number of entries now pending.
    pub fn enqueue(&self, write: PendingWrite) -> Result<usize, StoreError> {
        let _guard = self.guard();
        let mut entries = self.load()?;
        debug!(write = %write.describe(), position = entries.len(), "Queueing write");
        entries.push(OutboxEntry::new(write));
        self.save(&entries)?;
        Ok(entries.len())
    }

    /// All pending entries in delivery order.
    pub fn peek_all(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        let _guard = self.guard();
        self.load()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.peek_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Remove a delivered entry and persist the remainder.
    ///
    /// Delivery is front first, so the entry is normally at index 0. Entries
    /// appended since the drain started stay queued.
    pub fn acknowledge(&self, delivered: &OutboxEntry) -> Result<(), StoreError> {
        let _guard = self.guard();
        let mut entries = self.load()?;
        match entries.iter().position(|e| e == delivered) {
            Some(index) => {
                if index != 0 {
                    warn!(index, "Delivered entry was not at the front of the outbox");
                }
                entries.remove(index);
                self.save(&entries)
            }
            None => {
                warn!(write = %delivered.write.describe(), "Delivered entry already gone from outbox");
                Ok(())
            }
        }
    }
}
