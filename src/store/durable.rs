//! Durable key-value store for normalized rate payloads
//!
//! The persistent tier: one JSON file per key inside a generation-tagged
//! directory, surviving restarts. The freshness gate writes parsed endpoint
//! payloads here; the interceptor reads them back by URL. Callers treat every
//! error from this store as a cache miss and fall through to the next tier.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{entry_file_name, generation_dir, list_generations, remove_generation, write_atomic};

/// Directory name prefix for durable store generations
const DIR_PREFIX: &str = "store-";

/// Errors from the durable store
///
/// Never surfaced to the consumer: the interceptor downgrades them to a miss.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage root cannot be created or accessed
    #[error("durable store unavailable at {path}: {source}")]
    Unavailable {
        /// Directory that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A value could not be encoded for persistence
    #[error("failed to encode value for key '{key}': {source}")]
    Encode {
        /// Store key being written
        key: String,
        /// Underlying serialization error
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk representation of one key-value pair
///
/// The key is stored inside the entry so a hash-named file can be verified
/// against the key it claims to hold.
#[derive(Debug, Serialize, Deserialize)]
struct StoreEntry {
    /// Primary key, the full endpoint URL for rate records
    key: String,
    /// Stored payload
    value: serde_json::Value,
    /// When this value was written
    stored_at: DateTime<Utc>,
}

/// Persistent generation-tagged key-value store
#[derive(Debug, Clone)]
pub struct DurableStore {
    /// Directory of the live generation
    dir: PathBuf,
}

impl DurableStore {
    /// Opens (creating if needed) the store for one generation
    ///
    /// # Returns
    /// * `Ok(DurableStore)` once the generation directory exists
    /// * `Err(StoreError::Unavailable)` if it cannot be created
    pub fn open(root: &Path, generation: &str) -> Result<Self, StoreError> {
        let dir = generation_dir(root, DIR_PREFIX, generation);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Unavailable {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Persists `value` under `key`, replacing any prior value
    ///
    /// The write is a temp-file-plus-rename, so it either fully persists or
    /// fails as a whole; a concurrent `get` sees the old value or the new
    /// one, never a mix.
    pub fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let entry = StoreEntry {
            key: key.to_string(),
            value: value.clone(),
            stored_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&entry).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        write_atomic(&self.dir.join(entry_file_name(key)), &json).map_err(|source| {
            StoreError::Unavailable {
                path: self.dir.clone(),
                source,
            }
        })
    }

    /// Returns the stored value for `key`, or `None` if absent
    ///
    /// A corrupt entry is treated as absent (and logged), matching the
    /// fall-through contract: the next tier recomputes it.
    pub fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.dir.join(entry_file_name(key));
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Unavailable {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        match serde_json::from_str::<StoreEntry>(&contents) {
            Ok(entry) if entry.key == key => Ok(Some(entry.value)),
            Ok(entry) => {
                warn!(
                    "durable store entry key mismatch: expected '{}', found '{}'",
                    key, entry.key
                );
                Ok(None)
            }
            Err(err) => {
                warn!("corrupt durable store entry for '{}': {}", key, err);
                Ok(None)
            }
        }
    }

    /// Lists every durable store generation present under `root`
    pub fn generations(root: &Path) -> Vec<String> {
        list_generations(root, DIR_PREFIX)
    }

    /// Deletes one generation's directory entirely
    pub fn delete_generation(root: &Path, generation: &str) -> io::Result<()> {
        remove_generation(root, DIR_PREFIX, generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_store(temp: &TempDir) -> DurableStore {
        DurableStore::open(temp.path(), "v1").expect("open should succeed")
    }

    #[test]
    fn test_get_before_any_put_is_none() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);

        let value = store.get("https://rates.example/latest/USD").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_put_then_get_returns_last_written_value() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);
        let key = "https://rates.example/latest/USD";

        store.put(key, &json!({"base_code": "USD", "rev": 1})).unwrap();
        store.put(key, &json!({"base_code": "USD", "rev": 2})).unwrap();

        let value = store.get(key).unwrap().expect("value should exist");
        assert_eq!(value, json!({"base_code": "USD", "rev": 2}));
    }

    #[test]
    fn test_keys_do_not_collide_across_urls() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);

        store.put("https://rates.example/latest/USD", &json!(1)).unwrap();
        store.put("https://rates.example/latest/EUR", &json!(2)).unwrap();

        assert_eq!(store.get("https://rates.example/latest/USD").unwrap(), Some(json!(1)));
        assert_eq!(store.get("https://rates.example/latest/EUR").unwrap(), Some(json!(2)));
    }

    #[test]
    fn test_corrupt_entry_reads_as_miss() {
        let temp = TempDir::new().expect("temp dir");
        let store = open_store(&temp);
        let key = "https://rates.example/latest/USD";
        store.put(key, &json!({"ok": true})).unwrap();

        // Clobber the entry file with invalid JSON
        let dir = temp.path().join("store-v1");
        let file = fs::read_dir(&dir).unwrap().next().unwrap().unwrap();
        fs::write(file.path(), "{ not json").unwrap();

        assert!(store.get(key).unwrap().is_none());
    }

    #[test]
    fn test_values_survive_reopen() {
        let temp = TempDir::new().expect("temp dir");
        let key = "https://rates.example/latest/USD";
        open_store(&temp).put(key, &json!({"persisted": true})).unwrap();

        let reopened = open_store(&temp);
        assert_eq!(reopened.get(key).unwrap(), Some(json!({"persisted": true})));
    }

    #[test]
    fn test_generations_listing_and_deletion() {
        let temp = TempDir::new().expect("temp dir");
        DurableStore::open(temp.path(), "v1").unwrap();
        DurableStore::open(temp.path(), "v2").unwrap();

        assert_eq!(DurableStore::generations(temp.path()), vec!["v1", "v2"]);

        DurableStore::delete_generation(temp.path(), "v1").unwrap();
        assert_eq!(DurableStore::generations(temp.path()), vec!["v2"]);
    }

    #[test]
    fn test_open_fails_when_root_is_a_file() {
        let temp = TempDir::new().expect("temp dir");
        let blocked = temp.path().join("blocked");
        fs::write(&blocked, "not a directory").unwrap();

        let result = DurableStore::open(&blocked, "v1");
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }
}
