//! Error taxonomy shared by the cache, outbox and sync layers.
//!
//! `StoreError` and `RemoteError` describe what went wrong in a single
//! collaborator. `SyncError` is what callers of the session see.

use std::path::PathBuf;

use thiserror::Error;

use crate::api::RemoteError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt entry {collection}/{key}: {reason}")]
    Corrupt {
        collection: &'static str,
        key: String,
        reason: String,
    },

    #[error("Failed to serialize entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Remote unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("Remote rejected request (status {status})")]
    RemoteRejected { status: u16, body: String },

    #[error("Data unavailable: no cached copy and the remote fetch failed ({0})")]
    DataUnavailable(String),

    #[error("Invalid data: {0}")]
    InvalidPayload(String),
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unreachable(reason) => SyncError::RemoteUnreachable(reason),
            RemoteError::Timeout { limit } => {
                SyncError::RemoteUnreachable(format!("timed out after {:?}", limit))
            }
            RemoteError::Rejected { status, body } => SyncError::RemoteRejected { status, body },
            RemoteError::InvalidPayload(reason) => SyncError::InvalidPayload(reason),
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
