//! Flushes the outbox to the remote once connectivity returns.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::invalidator::CacheInvalidator;
use super::outbox::{Invalidation, Outbox};
use crate::api::{with_timeout, RemoteEndpoint};
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    Draining,
}

#[derive(Debug)]
pub enum DrainOutcome {
    /// Every entry present when the drain started was delivered
    Complete,
    /// Some entries were delivered before a failure stopped the drain
    Partial(SyncError),
    /// The first entry failed; nothing was delivered
    NoProgress(SyncError),
    /// Another drain was already running; this call did nothing
    Coalesced,
}

/// Summary of one `drain()` call.
#[derive(Debug)]
pub struct DrainResult {
    pub outcome: DrainOutcome,
    /// Entries confirmed by the remote during this run
    pub sent: usize,
    /// Entries still persisted in the outbox afterwards
    pub remaining: usize,
    /// Restaurants whose writes were delivered during this run
    pub affected: BTreeSet<u64>,
}

impl DrainResult {
    fn coalesced(remaining: usize) -> Self {
        Self {
            outcome: DrainOutcome::Coalesced,
            sent: 0,
            remaining,
            affected: BTreeSet::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, DrainOutcome::Complete)
    }

    pub fn error(&self) -> Option<&SyncError> {
        match &self.outcome {
            DrainOutcome::Partial(e) | DrainOutcome::NoProgress(e) => Some(e),
            DrainOutcome::Complete | DrainOutcome::Coalesced => None,
        }
    }
}

/// Delivers outbox entries one at a time, persisting after each delivery.
///
/// At most one drain runs at a time; a call made while another is running
/// returns `DrainOutcome::Coalesced` immediately.
pub struct SyncDrainer {
    outbox: Arc<Outbox>,
    remote: Arc<dyn RemoteEndpoint>,
    invalidator: CacheInvalidator,
    timeout: Duration,
    running: Mutex<()>,
}

impl SyncDrainer {
    pub fn new(
        outbox: Arc<Outbox>,
        remote: Arc<dyn RemoteEndpoint>,
        invalidator: CacheInvalidator,
        timeout: Duration,
    ) -> Self {
        Self {
            outbox,
            remote,
            invalidator,
            timeout,
            running: Mutex::new(()),
        }
    }

    pub fn state(&self) -> DrainState {
        if self.running.try_lock().is_ok() {
            DrainState::Idle
        } else {
            DrainState::Draining
        }
    }

    /// Deliver pending writes in submission order.
    ///
    /// A delivered entry is removed from the persisted outbox before the next
    /// one is sent, so a restart never resends a confirmed write. The first
    /// failure stops the run and leaves the failed entry and everything after
    /// it queued for the next trigger. Entries queued while the drain runs are
    /// left for the next drain.
    pub async fn drain(&self) -> DrainResult {
        let Ok(_running) = self.running.try_lock() else {
            debug!("Drain already in progress, coalescing trigger");
            let remaining = self.outbox.len().unwrap_or_else(|e| {
                warn!(error = %e, "Could not count outbox entries");
                0
            });
            return DrainResult::coalesced(remaining);
        };

        let working = match self.outbox.peek_all() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not read outbox");
                return DrainResult {
                    outcome: DrainOutcome::NoProgress(e.into()),
                    sent: 0,
                    remaining: 0,
                    affected: BTreeSet::new(),
                };
            }
        };

        if working.is_empty() {
            debug!("Outbox empty, nothing to sync");
            return DrainResult {
                outcome: DrainOutcome::Complete,
                sent: 0,
                remaining: 0,
                affected: BTreeSet::new(),
            };
        }

        info!(pending = working.len(), "Draining outbox");
        let mut delivered = Vec::new();
        let mut failure: Option<SyncError> = None;

        for entry in &working {
            match with_timeout(self.timeout, entry.write.send(self.remote.as_ref())).await {
                Ok(_) => {
                    debug!(write = %entry.write.describe(), "Write delivered");
                    delivered.push(entry);
                    if let Err(e) = self.outbox.acknowledge(entry) {
                        // Sending the next entry now could not be undone by a restart
                        warn!(error = %e, write = %entry.write.describe(), "Delivered write could not be removed from outbox; it may be sent again");
                        failure = Some(e.into());
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, write = %entry.write.describe(), "Write delivery failed, keeping it queued");
                    failure = Some(e.into());
                    break;
                }
            }
        }

        let affected: BTreeSet<u64> = delivered.iter().map(|e| e.parent_id()).collect();
        let targets: BTreeSet<Invalidation> =
            delivered.iter().map(|e| e.write.invalidation()).collect();
        let refreshed = self.invalidator.apply_all(&targets).await;
        if refreshed < targets.len() {
            warn!(refreshed, targets = targets.len(), "Some cache entries stay stale until their next read");
        } else {
            debug!(refreshed, "Cache entries refreshed after drain");
        }

        let remaining = self.outbox.len().unwrap_or_else(|e| {
            warn!(error = %e, "Could not count remaining outbox entries");
            working.len() - delivered.len()
        });

        let outcome = match failure {
            None => DrainOutcome::Complete,
            Some(e) if delivered.is_empty() => DrainOutcome::NoProgress(e),
            Some(e) => DrainOutcome::Partial(e),
        };
        info!(sent = delivered.len(), remaining, outcome = ?outcome, "Drain finished");

        DrainResult {
            outcome,
            sent: delivered.len(),
            remaining,
            affected,
        }
    }
}
