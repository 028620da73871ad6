use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::store::{CachedData, Collection, DurableStore};
use crate::error::StoreError;

/// Bumped whenever the on-disk cache format changes. Cache collections
/// written under another version are discarded on open; pending writes are
/// always kept.
pub const STORE_VERSION: u32 = 3;

const VERSION_FILE: &str = "version";

/// Durable store backed by one JSON file per key, grouped in one directory
/// per collection.
pub struct FileStore {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl FileStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let unavailable = |e: std::io::Error| StoreError::Unavailable {
            path: root.clone(),
            reason: e.to_string(),
        };

        for collection in Collection::ALL {
            std::fs::create_dir_all(root.join(collection.as_str())).map_err(unavailable)?;
        }

        let store = Self {
            root,
            tmp_seq: AtomicU64::new(0),
        };
        store.check_version()?;
        debug!(root = %store.root.display(), "File store opened");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_version(&self) -> Result<(), StoreError> {
        let path = self.root.join(VERSION_FILE);
        let found = match std::fs::read_to_string(&path) {
            Ok(contents) => contents.trim().parse::<u32>().ok(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                std::fs::write(&path, STORE_VERSION.to_string())?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if found != Some(STORE_VERSION) {
            info!(found = ?found, expected = STORE_VERSION, "Cache format changed, discarding cached data");
            for collection in Collection::ALL.into_iter().filter(Collection::is_cache) {
                let dir = self.root.join(collection.as_str());
                std::fs::remove_dir_all(&dir)?;
                std::fs::create_dir_all(&dir)?;
            }
            std::fs::write(&path, STORE_VERSION.to_string())?;
        }
        Ok(())
    }

    fn entry_path(&self, collection: Collection, key: &str) -> PathBuf {
        self.root
            .join(collection.as_str())
            .join(format!("{}.json", encode_key(key)))
    }
}

impl DurableStore for FileStore {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<CachedData<Value>>, StoreError> {
        let path = self.entry_path(collection, key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let cached: CachedData<Value> =
            serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
                collection: collection.as_str(),
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(cached))
    }

    fn put(&self, collection: Collection, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.entry_path(collection, key);
        let contents = serde_json::to_vec_pretty(&CachedData::new(value))?;

        // Readers only ever see the file after rename, never a half-written one
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("json.{}.tmp", seq));
        std::fs::write(&tmp_path, contents)?;
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
                warn!(error = %cleanup, path = %tmp_path.display(), "Failed to remove temp file");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Map a key onto a file-safe name. Alphanumerics, `-` and `_` pass through;
/// everything else is hex-escaped so distinct keys never share a file.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}
