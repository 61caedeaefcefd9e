//! On-device key-value storage.
//!
//! Persists small JSON documents (cart snapshot, pending-order queue, Home
//! screen product list) as one file per key under a fixed directory. Reads
//! are forgiving (a missing or unreadable key is `None`) while writes are
//! fail-fast.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};

/// Storage key for the persisted cart snapshot.
pub const KEY_CART: &str = "cart";
/// Storage key for the pending-order queue.
pub const KEY_PENDING_ORDERS: &str = "pendingOrders";
/// Storage key for the Home screen's product list.
pub const KEY_HOME_PRODUCTS: &str = "products";

/// File-backed key-value store. Cheap to clone around the app root.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
}

impl LocalStorage {
    /// Open (and create if needed) the storage directory.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| Error::Storage(format!("create storage dir: {e}")))?;
        Ok(LocalStorage {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read the raw string stored under `key`. `None` when the key is
    /// absent or unreadable.
    pub fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!(key, error = %e, "storage: failed to read key");
                None
            }
        }
    }

    /// Store a raw string under `key`.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::write(self.path_for(key), value)
            .map_err(|e| Error::Storage(format!("write key {key}: {e}")))
    }

    /// Delete a key. Silently succeeds when it does not exist.
    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(path).map_err(|e| Error::Storage(format!("remove key {key}: {e}")))
    }

    /// Read and deserialize the JSON stored under `key`. Absent keys and
    /// parse failures both come back as `None`; parse failures are logged.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "storage: stored JSON is malformed");
                None
            }
        }
    }

    /// Serialize and store a value under `key`.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| Error::Storage(format!("serialize key {key}: {e}")))?;
        self.set(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path()).expect("open storage");
        (dir, storage)
    }

    #[test]
    fn test_get_absent_key_is_none() {
        let (_dir, storage) = test_storage();
        assert_eq!(storage.get("missing"), None);
        assert_eq!(storage.get_json::<Vec<String>>("missing"), None);
    }

    #[test]
    fn test_set_get_remove_round_trip() {
        let (_dir, storage) = test_storage();
        storage.set(KEY_CART, "[]").expect("set");
        assert_eq!(storage.get(KEY_CART).as_deref(), Some("[]"));

        storage.remove(KEY_CART).expect("remove");
        assert_eq!(storage.get(KEY_CART), None);

        // Removing again is not an error.
        storage.remove(KEY_CART).expect("remove absent");
    }

    #[test]
    fn test_json_round_trip() {
        let (_dir, storage) = test_storage();
        let value = vec!["u1".to_string(), "u2".to_string()];
        storage.set_json(KEY_HOME_PRODUCTS, &value).expect("set");
        assert_eq!(storage.get_json::<Vec<String>>(KEY_HOME_PRODUCTS), Some(value));
    }

    #[test]
    fn test_malformed_json_reads_as_none() {
        let (_dir, storage) = test_storage();
        storage.set(KEY_CART, "{not json").expect("set");
        assert_eq!(storage.get_json::<Vec<String>>(KEY_CART), None);
    }
}
