//! Outbox and background synchronisation.
//!
//! Writes are always queued in the `Outbox` first. The `SyncDrainer` flushes
//! the queue when a trigger fires and hands the affected restaurants to the
//! `CacheInvalidator`, which refreshes their cached reads.

pub mod drainer;
pub mod invalidator;
pub mod outbox;
pub mod trigger;

pub use drainer::{DrainOutcome, DrainResult, DrainState, SyncDrainer};
pub use invalidator::CacheInvalidator;
pub use outbox::{Invalidation, Outbox, OutboxEntry, PendingWrite};
pub use trigger::{spawn_sync_loop, Connectivity, SyncTrigger};
