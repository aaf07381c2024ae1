//! Generation-tagged request/response cache
//!
//! Holds previously fetched assets, the raw endpoint response used as an
//! offline fallback, and the reserved last-fetch timestamp the freshness gate
//! reads. Entries are whole responses, written wholesale; there is no partial
//! mutation.

use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::{entry_file_name, generation_dir, list_generations, remove_generation, write_atomic};
use crate::config::LayerConfig;
use crate::fetch::Fetcher;
use crate::http::{CacheRequest, CachedResponse};

/// Directory name prefix for cache generations
const DIR_PREFIX: &str = "cache-";

/// Reserved key recording the last successful endpoint fetch
///
/// Cannot collide with a response entry: response keys always carry a
/// `METHOD ` prefix.
pub const LAST_FETCH_KEY: &str = "last-api-call-timestamp";

/// Errors from the ephemeral cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory cannot be created or accessed
    #[error("ephemeral cache unavailable at {path}: {source}")]
    Unavailable {
        /// Directory that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Install-time prefetch left some assets uncached
    #[error("asset prefetch incomplete, {} asset(s) failed: {}", failed.len(), failed.join(", "))]
    Prefetch {
        /// URLs that could not be fetched and cached
        failed: Vec<String>,
    },

    /// An entry could not be encoded for persistence
    #[error("failed to encode cache entry '{key}': {source}")]
    Encode {
        /// Cache key being written
        key: String,
        /// Underlying serialization error
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk representation of one cached request/response pair
#[derive(Debug, Serialize, Deserialize)]
struct AssetEntry {
    /// Normalized cache key of the request
    key: String,
    /// The request this entry answers
    request: CacheRequest,
    /// The stored response
    response: CachedResponse,
}

/// On-disk representation of the reserved timestamp key
#[derive(Debug, Serialize, Deserialize)]
struct TimestampEntry {
    /// Always [`LAST_FETCH_KEY`]
    key: String,
    /// Epoch milliseconds of the last successful endpoint fetch
    millis: i64,
}

/// Generation-scoped request/response cache on disk
#[derive(Debug, Clone)]
pub struct EphemeralCache {
    /// Directory of the live generation
    dir: PathBuf,
    /// Origin whose responses may be cached
    allowed_origin: String,
    /// The one URL exempt from the origin guard
    endpoint_url: String,
}

impl EphemeralCache {
    /// Opens (creating if needed) the cache for the configured generation
    pub fn open(config: &LayerConfig) -> Result<Self, CacheError> {
        let dir = generation_dir(&config.root, DIR_PREFIX, &config.generation);
        fs::create_dir_all(&dir).map_err(|source| CacheError::Unavailable {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            allowed_origin: config.allowed_origin.clone(),
            endpoint_url: config.endpoint_url.clone(),
        })
    }

    /// Stores a response for a request, replacing any prior entry
    ///
    /// Writes for URLs outside the allowed origin are skipped, not errors:
    /// an uncontrolled cross-origin response must never poison the cache.
    /// The distinguished endpoint is the one exemption, since its response
    /// is the whole point of the offline fallback.
    ///
    /// # Returns
    /// * `Ok(true)` if the entry was written
    /// * `Ok(false)` if the origin guard skipped the write
    pub fn put(
        &self,
        request: &CacheRequest,
        response: &CachedResponse,
    ) -> Result<bool, CacheError> {
        let url = request.url();
        if !url.starts_with(&self.allowed_origin) && url != self.endpoint_url {
            debug!("skipping cache write for foreign origin: {}", url);
            return Ok(false);
        }

        let key = request.cache_key();
        let entry = AssetEntry {
            key: key.clone(),
            request: request.clone(),
            response: response.clone(),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|source| CacheError::Encode { key, source })?;
        write_atomic(&self.dir.join(entry_file_name(&entry.key)), &json).map_err(|source| {
            CacheError::Unavailable {
                path: self.dir.clone(),
                source,
            }
        })?;
        Ok(true)
    }

    /// Returns the cached response for a request, or `None` on a miss
    ///
    /// Corrupt entries read as misses; the routing layers recover by falling
    /// through to the next tier.
    pub fn lookup(&self, request: &CacheRequest) -> Result<Option<CachedResponse>, CacheError> {
        let key = request.cache_key();
        let path = self.dir.join(entry_file_name(&key));
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Unavailable {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        match serde_json::from_str::<AssetEntry>(&contents) {
            Ok(entry) if entry.key == key => Ok(Some(entry.response)),
            Ok(_) | Err(_) => {
                warn!("corrupt cache entry for '{}', treating as miss", key);
                Ok(None)
            }
        }
    }

    /// Prefetches and caches a fixed set of assets
    ///
    /// Relative asset paths resolve against the allowed origin. All fetches
    /// run concurrently; each success is cached immediately, so a partial
    /// failure leaves the successful entries in place (best-effort, not
    /// transactional; unreachable assets are simply absent, not retried).
    ///
    /// # Returns
    /// * `Ok(())` if every asset was fetched and cached
    /// * `Err(CacheError::Prefetch)` listing the assets that failed
    pub async fn add_all(&self, fetcher: &dyn Fetcher, assets: &[String]) -> Result<(), CacheError> {
        let requests: Vec<CacheRequest> = assets
            .iter()
            .map(|asset| CacheRequest::get(self.resolve_asset_url(asset)))
            .collect();

        let results = join_all(requests.iter().map(|request| fetcher.fetch(request))).await;

        let mut failed = Vec::new();
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(response) => {
                    if let Err(err) = self.put(request, &response) {
                        warn!("failed to cache prefetched asset {}: {}", request.url(), err);
                        failed.push(request.url().to_string());
                    }
                }
                Err(err) => {
                    warn!("failed to prefetch {}: {}", request.url(), err);
                    failed.push(request.url().to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Prefetch { failed })
        }
    }

    /// Reads the last successful endpoint fetch time, if any was recorded
    pub fn last_fetch_timestamp(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        let path = self.dir.join(entry_file_name(LAST_FETCH_KEY));
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Unavailable {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        match serde_json::from_str::<TimestampEntry>(&contents) {
            Ok(entry) => Ok(Utc.timestamp_millis_opt(entry.millis).single()),
            Err(err) => {
                warn!("corrupt last-fetch timestamp, treating as never fetched: {}", err);
                Ok(None)
            }
        }
    }

    /// Records the time of a successful endpoint fetch
    ///
    /// The stored value is monotonically non-decreasing: an earlier time than
    /// the one already recorded is ignored.
    pub fn set_last_fetch_timestamp(&self, at: DateTime<Utc>) -> Result<(), CacheError> {
        if let Some(existing) = self.last_fetch_timestamp()? {
            if at < existing {
                return Ok(());
            }
        }
        let entry = TimestampEntry {
            key: LAST_FETCH_KEY.to_string(),
            millis: at.timestamp_millis(),
        };
        let json = serde_json::to_string_pretty(&entry).map_err(|source| CacheError::Encode {
            key: LAST_FETCH_KEY.to_string(),
            source,
        })?;
        write_atomic(&self.dir.join(entry_file_name(LAST_FETCH_KEY)), &json).map_err(|source| {
            CacheError::Unavailable {
                path: self.dir.clone(),
                source,
            }
        })
    }

    /// Lists every cache generation present under `root`
    pub fn generations(root: &Path) -> Vec<String> {
        list_generations(root, DIR_PREFIX)
    }

    /// Deletes one generation's directory entirely
    pub fn delete_generation(root: &Path, generation: &str) -> io::Result<()> {
        remove_generation(root, DIR_PREFIX, generation)
    }

    /// Resolves a possibly relative asset path against the allowed origin
    fn resolve_asset_url(&self, asset: &str) -> String {
        if asset.starts_with("http://") || asset.starts_with("https://") {
            asset.to_string()
        } else {
            format!(
                "{}/{}",
                self.allowed_origin.trim_end_matches('/'),
                asset.trim_start_matches('/')
            )
        }
    }
}
