//! Configuration for the caching layer
//!
//! Everything that was ambient module state in a typical service-worker
//! script (the cache name, the allowed origin, the throttled endpoint) is an
//! explicit field here, passed to each component at construction.

use chrono::Duration;
use directories::ProjectDirs;
use std::path::PathBuf;

/// Default bound on how often the rate endpoint may be fetched
const DEFAULT_REFRESH_INTERVAL_HOURS: i64 = 24;

/// Construction-time configuration shared by all components
#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// Current cache generation tag; bumped on deploy, all others are garbage
    pub generation: String,
    /// Origin whose responses may be cached; writes for other origins are dropped
    pub allowed_origin: String,
    /// The one rate-providing URL subject to the freshness gate
    pub endpoint_url: String,
    /// Minimum spacing between successful endpoint fetches
    pub refresh_interval: Duration,
    /// Assets prefetched at install time
    pub precache_assets: Vec<String>,
    /// Directory holding every store and cache generation
    pub root: PathBuf,
}

impl LayerConfig {
    /// Creates a configuration rooted at the XDG cache directory
    ///
    /// Returns `None` if no home directory can be determined, in which case
    /// the caller should fall back to [`LayerConfig::with_root`].
    pub fn new(
        generation: impl Into<String>,
        allowed_origin: impl Into<String>,
        endpoint_url: impl Into<String>,
    ) -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "ratecache")?;
        Some(Self::with_root(
            generation,
            allowed_origin,
            endpoint_url,
            project_dirs.cache_dir().to_path_buf(),
        ))
    }

    /// Creates a configuration with an explicit storage root
    ///
    /// Used by tests and by hosts that manage their own storage location.
    pub fn with_root(
        generation: impl Into<String>,
        allowed_origin: impl Into<String>,
        endpoint_url: impl Into<String>,
        root: PathBuf,
    ) -> Self {
        Self {
            generation: generation.into(),
            allowed_origin: allowed_origin.into(),
            endpoint_url: endpoint_url.into(),
            refresh_interval: Duration::hours(DEFAULT_REFRESH_INTERVAL_HOURS),
            precache_assets: Vec::new(),
            root,
        }
    }

    /// Sets the refresh interval for the endpoint
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Sets the assets to prefetch at install time
    pub fn precache_assets(mut self, assets: Vec<String>) -> Self {
        self.precache_assets = assets;
        self
    }

    /// Whether a URL belongs to the allowed origin
    pub fn is_allowed_origin(&self, url: &str) -> bool {
        url.starts_with(&self.allowed_origin)
    }

    /// Whether a URL is the distinguished rate endpoint
    ///
    /// Matched by exact string equality; near-misses go through the normal
    /// asset tiers.
    pub fn is_endpoint(&self, url: &str) -> bool {
        url == self.endpoint_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LayerConfig {
        LayerConfig::with_root(
            "v1",
            "https://converter.example",
            "https://rates.example/v6/latest/USD",
            PathBuf::from("/tmp/ratecache-test"),
        )
    }

    #[test]
    fn test_default_refresh_interval_is_24_hours() {
        assert_eq!(test_config().refresh_interval, Duration::hours(24));
    }

    #[test]
    fn test_endpoint_match_is_exact() {
        let config = test_config();
        assert!(config.is_endpoint("https://rates.example/v6/latest/USD"));
        assert!(!config.is_endpoint("https://rates.example/v6/latest/USD?x=1"));
        assert!(!config.is_endpoint("https://rates.example/v6/latest/EUR"));
    }

    #[test]
    fn test_origin_check_is_prefix_based() {
        let config = test_config();
        assert!(config.is_allowed_origin("https://converter.example/index.html"));
        assert!(!config.is_allowed_origin("https://evil.example/index.html"));
    }

    #[test]
    fn test_builder_setters() {
        let config = test_config()
            .refresh_interval(Duration::minutes(5))
            .precache_assets(vec!["index.html".to_string()]);
        assert_eq!(config.refresh_interval, Duration::minutes(5));
        assert_eq!(config.precache_assets, vec!["index.html".to_string()]);
    }
}
