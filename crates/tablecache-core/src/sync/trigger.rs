//! Event sources that start a drain.
//!
//! Connectivity detection lives outside this crate: the environment owns a
//! `watch::Sender<Connectivity>` and publishes changes. Explicit sync
//! requests arrive through a `SyncTrigger`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::drainer::{DrainResult, SyncDrainer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Handle for requesting a background sync.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Create a trigger and the receiving end consumed by the sync loop.
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        // One slot: requests made while one is already waiting are coalesced
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Ask for a sync. Returns false once the sync loop has stopped.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Run `drainer` whenever connectivity comes back or a sync is requested.
///
/// Drains once at start when already online. Runs until both event sources
/// are closed. Each drain result is forwarded on the returned receiver;
/// dropping the receiver is fine.
pub fn spawn_sync_loop(
    drainer: Arc<SyncDrainer>,
    mut connectivity: watch::Receiver<Connectivity>,
    mut triggers: mpsc::Receiver<()>,
) -> (JoinHandle<()>, mpsc::UnboundedReceiver<DrainResult>) {
    let (results_tx, results_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let run = |reason: &'static str| {
            let drainer = Arc::clone(&drainer);
            let results_tx = results_tx.clone();
            async move {
                info!(reason, "Sync triggered");
                let result = drainer.drain().await;
                if results_tx.send(result).is_err() {
                    debug!("Drain result receiver dropped");
                }
            }
        };

        let mut online = *connectivity.borrow_and_update() == Connectivity::Online;
        if online {
            run("online at startup").await;
        }

        let mut connectivity_open = true;
        let mut triggers_open = true;
        while connectivity_open || triggers_open {
            tokio::select! {
                changed = connectivity.changed(), if connectivity_open => {
                    if changed.is_err() {
                        debug!("Connectivity source closed");
                        connectivity_open = false;
                        continue;
                    }
                    let now_online = *connectivity.borrow_and_update() == Connectivity::Online;
                    if now_online && !online {
                        run("connectivity restored").await;
                    }
                    online = now_online;
                }
                trigger = triggers.recv(), if triggers_open => {
                    match trigger {
                        Some(()) => run("sync requested").await,
                        None => {
                            debug!("Sync trigger closed");
                            triggers_open = false;
                        }
                    }
                }
            }
        }
        debug!("Sync loop stopped");
    });

    (handle, results_rx)
}
