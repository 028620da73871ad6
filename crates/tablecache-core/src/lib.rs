//! Core library for tablecache - an offline-first client for the restaurant
//! reviews service.
//!
//! Reads are served from a durable local cache first and refreshed from the
//! remote in the background. Writes are queued in a durable outbox and
//! delivered when connectivity returns, after which the affected cache
//! entries are refreshed.
//!
//! Start with [`Session`], which exposes every caller-facing operation.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod session;
pub mod sync;

pub use api::{HttpRemote, RemoteEndpoint, RemoteError, Resource};
pub use cache::{
    CachedData, Collection, DurableStore, Fetched, FileStore, MemoryStore, Source, UnavailableStore,
};
pub use config::Config;
pub use error::{StoreError, SyncError, SyncResult};
pub use models::{NewReview, Restaurant, Review};
pub use session::{Session, SubmitReceipt};
pub use sync::{
    spawn_sync_loop, Connectivity, DrainOutcome, DrainResult, DrainState, OutboxEntry,
    PendingWrite, SyncTrigger,
};
