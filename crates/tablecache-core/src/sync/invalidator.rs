use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use super::outbox::Invalidation;
use crate::api::Resource;
use crate::cache::{Collection, ReadThroughCache, RemoteRequest, ALL_KEY};
use crate::error::SyncResult;
use crate::models::{Restaurant, Review};

/// Re-fetches cache entries made stale by delivered writes.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<ReadThroughCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<ReadThroughCache>) -> Self {
        Self { cache }
    }

    /// Refresh the reviews cached for `parent_id`.
    pub async fn invalidate(&self, parent_id: u64) -> SyncResult<()> {
        self.cache
            .refresh::<Vec<Review>>(
                Collection::Reviews,
                &parent_id.to_string(),
                RemoteRequest::ByParent(Resource::Reviews, parent_id),
            )
            .await
    }

    /// Refresh a restaurant entity and the full restaurant list.
    pub async fn invalidate_restaurant(&self, id: u64) -> SyncResult<()> {
        self.cache
            .refresh::<Restaurant>(
                Collection::Restaurants,
                &id.to_string(),
                RemoteRequest::ById(Resource::Restaurants, id),
            )
            .await?;
        self.cache
            .refresh::<Vec<Restaurant>>(
                Collection::Restaurants,
                ALL_KEY,
                RemoteRequest::Collection(Resource::Restaurants),
            )
            .await
    }

    async fn apply(&self, target: Invalidation) -> SyncResult<()> {
        match target {
            Invalidation::Reviews(parent_id) => self.invalidate(parent_id).await,
            Invalidation::Restaurant(id) => self.invalidate_restaurant(id).await,
        }
    }

    /// Run every invalidation independently. Failures are logged and leave the
    /// stale entry in place until its next read refreshes it.
    /// Returns how many targets were refreshed.
    pub async fn apply_all(&self, targets: &BTreeSet<Invalidation>) -> usize {
        let results = join_all(targets.iter().map(|&target| async move {
            (target, self.apply(target).await)
        }))
        .await;

        let mut refreshed = 0;
        for (target, result) in results {
            match result {
                Ok(()) => {
                    debug!(?target, "Cache entry refreshed after sync");
                    refreshed += 1;
                }
                Err(e) => warn!(?target, error = %e, "Cache update after clearing outbox failed"),
            }
        }
        refreshed
    }
}
