//! Caller-facing entry point tying the cache, outbox and drainer together.
//!
//! A `Session` is owned by the caller and passed around explicitly; there is
//! no process-wide state.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::api::{RemoteEndpoint, Resource};
use crate::cache::{Collection, DurableStore, Fetched, ReadThroughCache, RemoteRequest, ALL_KEY};
use crate::error::{SyncError, SyncResult};
use crate::models::{NewReview, Restaurant, Review};
use crate::query;
use crate::sync::{
    CacheInvalidator, DrainResult, DrainState, Outbox, OutboxEntry, PendingWrite, SyncDrainer,
};

/// Acknowledgement that a write was durably queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Writes waiting for delivery, including this one
    pub pending: usize,
}

pub struct Session {
    cache: Arc<ReadThroughCache>,
    outbox: Arc<Outbox>,
    drainer: Arc<SyncDrainer>,
}

impl Session {
    /// Build a session over a store and a remote. `timeout` bounds every
    /// remote call made on the session's behalf.
    pub fn new(store: Arc<dyn DurableStore>, remote: Arc<dyn RemoteEndpoint>, timeout: Duration) -> Self {
        let cache = Arc::new(ReadThroughCache::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            timeout,
        ));
        let outbox = Arc::new(Outbox::new(store));
        let drainer = Arc::new(SyncDrainer::new(
            Arc::clone(&outbox),
            remote,
            CacheInvalidator::new(Arc::clone(&cache)),
            timeout,
        ));

        Self {
            cache,
            outbox,
            drainer,
        }
    }

    // ===== Reads =====

    pub async fn fetch_entity(&self, id: u64) -> SyncResult<Fetched<Restaurant>> {
        self.cache
            .fetch(
                Collection::Restaurants,
                &id.to_string(),
                RemoteRequest::ById(Resource::Restaurants, id),
            )
            .await
    }

    pub async fn fetch_children_of(&self, parent_id: u64) -> SyncResult<Fetched<Vec<Review>>> {
        self.cache
            .fetch(
                Collection::Reviews,
                &parent_id.to_string(),
                RemoteRequest::ByParent(Resource::Reviews, parent_id),
            )
            .await
    }

    pub async fn fetch_all(&self) -> SyncResult<Fetched<Vec<Restaurant>>> {
        self.cache
            .fetch(
                Collection::Restaurants,
                ALL_KEY,
                RemoteRequest::Collection(Resource::Restaurants),
            )
            .await
    }

    // ===== Derived reads =====

    pub async fn filter_by_attribute(&self, attr: &str, value: &str) -> SyncResult<Vec<Restaurant>> {
        let all = self.fetch_all().await?;
        Ok(query::filter_by_attribute(&all.value, attr, value))
    }

    pub async fn distinct_values_of(&self, attr: &str) -> SyncResult<Vec<String>> {
        let all = self.fetch_all().await?;
        Ok(query::distinct_values_of(&all.value, attr))
    }

    pub async fn filter_by_cuisine_and_neighborhood(
        &self,
        cuisine: &str,
        neighborhood: &str,
    ) -> SyncResult<Vec<Restaurant>> {
        let all = self.fetch_all().await?;
        Ok(query::filter_by_cuisine_and_neighborhood(&all.value, cuisine, neighborhood))
    }

    // ===== Writes =====

    /// Queue a review for delivery. The review is validated first; a write
    /// that cannot be persisted is reported as an error, never dropped.
    pub fn submit_write(&self, review: NewReview) -> SyncResult<SubmitReceipt> {
        review.validate().map_err(SyncError::InvalidPayload)?;
        self.queue(PendingWrite::Review(review))
    }

    /// Queue a favorite flag change for a restaurant.
    pub fn set_favorite(&self, restaurant_id: u64, is_favorite: bool) -> SyncResult<SubmitReceipt> {
        self.queue(PendingWrite::Favorite {
            restaurant_id,
            is_favorite,
        })
    }

    fn queue(&self, write: PendingWrite) -> SyncResult<SubmitReceipt> {
        let description = write.describe();
        let pending = self.outbox.enqueue(write)?;
        info!(write = %description, pending, "Write queued");
        Ok(SubmitReceipt { pending })
    }

    pub fn pending_writes(&self) -> SyncResult<Vec<OutboxEntry>> {
        Ok(self.outbox.peek_all()?)
    }

    // ===== Sync =====

    pub async fn drain(&self) -> DrainResult {
        self.drainer.drain().await
    }

    pub fn drain_state(&self) -> DrainState {
        self.drainer.state()
    }

    /// Shared handle for running the drainer from a sync loop.
    pub fn drainer(&self) -> Arc<SyncDrainer> {
        Arc::clone(&self.drainer)
    }

    /// Wait for background cache refreshes started by earlier reads.
    pub async fn settle(&self) {
        self.cache.settle().await;
    }
}
