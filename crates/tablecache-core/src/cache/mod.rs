//! Local caching module for offline data access.
//!
//! This module provides the durable store used by both the read path and the
//! outbox, and the `ReadThroughCache` that serves stored data first and
//! refreshes it from the remote in the background.
//!
//! Store backends:
//! - `FileStore`: one JSON file per key, written atomically
//! - `MemoryStore`: in-process, for tests and ephemeral sessions
//! - `UnavailableStore`: stands in when the store cannot be opened
//!
//! Entries are never evicted; the cache grows with the data it has seen.

pub mod file_store;
pub mod read_through;
pub mod store;

pub use file_store::FileStore;
pub use read_through::{Fetched, ReadThroughCache, RemoteRequest, Source};
pub use store::{
    CachedData, Collection, DurableStore, MemoryStore, UnavailableStore, ALL_KEY, OUTBOX_KEY,
};
