//! Freshness gate for the distinguished rate endpoint
//!
//! Bounds how often the remote rate API is called: at most once per refresh
//! interval, no matter how many requests the consumer issues. This is a rate
//! limiter, not a cache invalidator: a fresh window is answered entirely
//! from the cache.

use chrono::{Duration, Utc};
use log::{debug, warn};

use crate::config::LayerConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::http::{CacheRequest, CachedResponse};
use crate::rates::RateTable;
use crate::store::{DurableStore, EphemeralCache};

/// Freshness of the last recorded endpoint fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Last fetch is younger than the refresh interval
    Fresh,
    /// Last fetch is as old as the interval, or none was ever recorded
    Stale,
}

/// Decides whether an endpoint request may skip the network
#[derive(Debug, Clone)]
pub struct FreshnessGate {
    /// Persistent tier for the parsed payload
    durable: DurableStore,
    /// Cache tier for the raw response and the timestamp
    cache: EphemeralCache,
    /// The one URL this gate governs
    endpoint_url: String,
    /// Minimum spacing between network fetches
    refresh_interval: Duration,
}

impl FreshnessGate {
    /// Creates a gate over the two stores for the configured endpoint
    pub fn new(durable: DurableStore, cache: EphemeralCache, config: &LayerConfig) -> Self {
        Self {
            durable,
            cache,
            endpoint_url: config.endpoint_url.clone(),
            refresh_interval: config.refresh_interval,
        }
    }

    /// Current freshness state
    ///
    /// Storage failures read as "never fetched": the safe direction, since a
    /// stale verdict only costs one network call.
    pub fn freshness(&self) -> Freshness {
        match self.cache.last_fetch_timestamp() {
            Ok(Some(at)) if Utc::now() - at < self.refresh_interval => Freshness::Fresh,
            Ok(_) => Freshness::Stale,
            Err(err) => {
                warn!("could not read last-fetch timestamp: {}", err);
                Freshness::Stale
            }
        }
    }

    /// Age of the last successful endpoint fetch, if one was recorded
    pub fn last_fetch_age(&self) -> Option<Duration> {
        match self.cache.last_fetch_timestamp() {
            Ok(Some(at)) => Some(Utc::now() - at),
            _ => None,
        }
    }

    /// Answers a request for the distinguished endpoint
    ///
    /// Fresh window: return the cached response without touching the
    /// network. A fresh timestamp with no cached response is inconsistent
    /// state; it is logged and recovered by refetching. Stale window: fetch,
    /// and on success record the timestamp, persist the parsed payload
    /// durably, and cache the raw response. A failed fetch propagates
    /// without updating the timestamp, so the next request retries instead
    /// of waiting out another interval.
    pub async fn handle(&self, fetcher: &dyn Fetcher) -> Result<CachedResponse, FetchError> {
        let request = CacheRequest::get(&self.endpoint_url);

        if self.freshness() == Freshness::Fresh {
            match self.cache.lookup(&request) {
                Ok(Some(response)) => {
                    debug!("endpoint fresh, serving cached response");
                    return Ok(response);
                }
                Ok(None) => {
                    warn!("fresh timestamp but no cached endpoint response, refetching");
                }
                Err(err) => {
                    warn!("cache lookup failed for endpoint, refetching: {}", err);
                }
            }
        }

        let response = fetcher.fetch(&request).await?;
        self.persist(&request, &response);
        Ok(response)
    }

    /// Best-effort persistence after a successful endpoint fetch
    ///
    /// The response is already in hand; nothing here may turn a successful
    /// fetch into a failure.
    fn persist(&self, request: &CacheRequest, response: &CachedResponse) {
        match response.json_payload() {
            Ok(payload) => match RateTable::from_payload(&payload) {
                Ok(_) => {
                    if let Err(err) = self.durable.put(&self.endpoint_url, &payload) {
                        warn!("failed to persist rate payload: {}", err);
                    }
                }
                Err(err) => warn!("endpoint payload failed validation, not persisting: {}", err),
            },
            Err(err) => warn!("endpoint response is not JSON, not persisting: {}", err),
        }

        if let Err(err) = self.cache.put(request, response) {
            warn!("failed to cache endpoint response: {}", err);
        }
        if let Err(err) = self.cache.set_last_fetch_timestamp(Utc::now()) {
            warn!("failed to record endpoint fetch time: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const ENDPOINT: &str = "https://rates.example/v6/latest/USD";

    struct EndpointFetcher {
        body: Option<Vec<u8>>,
        calls: AtomicUsize,
    }

    impl EndpointFetcher {
        fn serving(body: serde_json::Value) -> Self {
            Self {
                body: Some(body.to_string().into_bytes()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                body: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for EndpointFetcher {
        async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.body {
                Some(body) => Ok(CachedResponse::new(200, Vec::new(), body.clone())),
                None => Err(FetchError::Status {
                    url: request.url().to_string(),
                    status: 503,
                }),
            }
        }
    }

    fn rate_payload() -> serde_json::Value {
        json!({
            "base_code": "USD",
            "conversion_rates": {"EUR": 0.92, "GBP": 0.79}
        })
    }

    fn build_gate(root: &Path, interval: Duration) -> FreshnessGate {
        let config = LayerConfig::with_root(
            "v1",
            "https://converter.example",
            ENDPOINT,
            root.to_path_buf(),
        )
        .refresh_interval(interval);
        let durable = DurableStore::open(&config.root, &config.generation).unwrap();
        let cache = EphemeralCache::open(&config).unwrap();
        FreshnessGate::new(durable, cache, &config)
    }

    #[tokio::test]
    async fn test_first_request_fetches_and_persists() {
        let temp = TempDir::new().expect("temp dir");
        let gate = build_gate(temp.path(), Duration::hours(24));
        let fetcher = EndpointFetcher::serving(rate_payload());

        let response = gate.handle(&fetcher).await.expect("fetch should succeed");

        assert_eq!(fetcher.call_count(), 1);
        assert!(response.is_success());
        assert_eq!(gate.freshness(), Freshness::Fresh);
        // Parsed payload landed in the durable store under the endpoint URL
        let stored = gate.durable.get(ENDPOINT).unwrap().expect("payload stored");
        assert_eq!(stored, rate_payload());
    }

    #[tokio::test]
    async fn test_fresh_window_serves_from_cache_without_network() {
        let temp = TempDir::new().expect("temp dir");
        let gate = build_gate(temp.path(), Duration::hours(24));
        let fetcher = EndpointFetcher::serving(rate_payload());

        let first = gate.handle(&fetcher).await.unwrap();
        let second = gate.handle(&fetcher).await.unwrap();

        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(first.body, second.body);
    }

    #[tokio::test]
    async fn test_timestamp_just_inside_interval_is_fresh() {
        let temp = TempDir::new().expect("temp dir");
        let gate = build_gate(temp.path(), Duration::hours(24));
        gate.cache
            .set_last_fetch_timestamp(Utc::now() - Duration::hours(24) + Duration::seconds(1))
            .unwrap();
        assert_eq!(gate.freshness(), Freshness::Fresh);
    }

    #[tokio::test]
    async fn test_timestamp_past_interval_triggers_one_fetch_and_updates() {
        let temp = TempDir::new().expect("temp dir");
        let gate = build_gate(temp.path(), Duration::hours(24));
        let expired = Utc::now() - Duration::hours(24) - Duration::seconds(1);
        gate.cache.set_last_fetch_timestamp(expired).unwrap();
        assert_eq!(gate.freshness(), Freshness::Stale);

        let fetcher = EndpointFetcher::serving(rate_payload());
        gate.handle(&fetcher).await.unwrap();

        assert_eq!(fetcher.call_count(), 1);
        let recorded = gate.cache.last_fetch_timestamp().unwrap().unwrap();
        assert!(recorded > expired);
    }

    #[tokio::test]
    async fn test_fresh_timestamp_without_cached_response_falls_through() {
        let temp = TempDir::new().expect("temp dir");
        let gate = build_gate(temp.path(), Duration::hours(24));
        // Inconsistent state: timestamp says fresh, but nothing is cached
        gate.cache.set_last_fetch_timestamp(Utc::now()).unwrap();

        let fetcher = EndpointFetcher::serving(rate_payload());
        let response = gate.handle(&fetcher).await.expect("fallthrough should fetch");

        assert_eq!(fetcher.call_count(), 1);
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_failed_fetch_propagates_and_leaves_timestamp_untouched() {
        let temp = TempDir::new().expect("temp dir");
        let gate = build_gate(temp.path(), Duration::hours(24));
        let fetcher = EndpointFetcher::failing();

        let result = gate.handle(&fetcher).await;

        assert!(matches!(result, Err(FetchError::Status { status: 503, .. })));
        assert!(gate.cache.last_fetch_timestamp().unwrap().is_none());
        // Next request retries immediately rather than waiting out an interval
        assert_eq!(gate.freshness(), Freshness::Stale);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_served_but_not_persisted_durably() {
        let temp = TempDir::new().expect("temp dir");
        let gate = build_gate(temp.path(), Duration::hours(24));
        let fetcher = EndpointFetcher::serving(json!({"error": "quota exceeded"}));

        let response = gate.handle(&fetcher).await.expect("fetch itself succeeded");

        assert!(response.is_success());
        assert!(gate.durable.get(ENDPOINT).unwrap().is_none());
        // The raw response and timestamp are still recorded
        assert_eq!(gate.freshness(), Freshness::Fresh);
    }
}
