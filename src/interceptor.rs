//! Request interceptor: the control point for every outgoing request
//!
//! Routes each request through a fixed tier order: freshness gate for the
//! distinguished endpoint, then durable store, ephemeral cache, navigation
//! preload, and finally the network. Durable-store-first favors previously
//! normalized data over raw cached bytes, which in turn beats going to the
//! network for a response that may already be on disk.

use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::LayerConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::gate::{Freshness, FreshnessGate};
use crate::generation::{GenerationManager, SweepReport};
use crate::http::{CacheRequest, CachedResponse};
use crate::store::{DurableStore, EphemeralCache};

/// The storage-backed tiers, opened together
///
/// Absent entirely when storage is unavailable (quota, permissions), in
/// which case every request falls through to the network.
struct Tiers {
    durable: DurableStore,
    cache: EphemeralCache,
    gate: FreshnessGate,
}

/// Intercepts requests from the consumer and answers them from the cheapest
/// available tier
pub struct RequestInterceptor {
    config: LayerConfig,
    tiers: Option<Tiers>,
    fetcher: Arc<dyn Fetcher>,
    /// Set once activation completes; the host may then hand preloaded
    /// responses into [`RequestInterceptor::intercept`]
    preload_enabled: AtomicBool,
}

impl RequestInterceptor {
    /// Creates an interceptor over the configured storage root
    ///
    /// Storage unavailability is not fatal: the interceptor degrades to a
    /// network-only pass-through and logs the reason once.
    pub fn new(config: LayerConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let tiers = Self::open_tiers(&config);
        Self {
            config,
            tiers,
            fetcher,
            preload_enabled: AtomicBool::new(false),
        }
    }

    fn open_tiers(config: &LayerConfig) -> Option<Tiers> {
        let durable = match DurableStore::open(&config.root, &config.generation) {
            Ok(durable) => durable,
            Err(err) => {
                warn!("storage unavailable, serving network-only: {}", err);
                return None;
            }
        };
        let cache = match EphemeralCache::open(config) {
            Ok(cache) => cache,
            Err(err) => {
                warn!("storage unavailable, serving network-only: {}", err);
                return None;
            }
        };
        let gate = FreshnessGate::new(durable.clone(), cache.clone(), config);
        Some(Tiers {
            durable,
            cache,
            gate,
        })
    }

    /// Install hook: prefetch the configured asset set
    ///
    /// A partial prefetch is logged, never fatal; unreachable assets are
    /// simply not pre-warmed and install completes.
    pub async fn on_install(&self) {
        let Some(tiers) = &self.tiers else {
            return;
        };
        if self.config.precache_assets.is_empty() {
            return;
        }
        if let Err(err) = tiers
            .cache
            .add_all(self.fetcher.as_ref(), &self.config.precache_assets)
            .await
        {
            error!("install-time prefetch incomplete: {}", err);
        }
    }

    /// Activation hook: collect stale generations and enable preload
    pub fn on_activate(&self) -> SweepReport {
        let report =
            GenerationManager::new(self.config.root.clone(), self.config.generation.clone())
                .collect();
        self.preload_enabled.store(true, Ordering::SeqCst);
        report
    }

    /// Whether activation has enabled navigation preload
    pub fn preload_enabled(&self) -> bool {
        self.preload_enabled.load(Ordering::SeqCst)
    }

    /// Freshness of the distinguished endpoint, for status reporting
    ///
    /// Reads as stale when storage is unavailable, matching the gate's own
    /// behavior.
    pub fn endpoint_freshness(&self) -> Freshness {
        match &self.tiers {
            Some(tiers) => tiers.gate.freshness(),
            None => Freshness::Stale,
        }
    }

    /// Age of the last successful endpoint fetch, if one was recorded
    pub fn endpoint_age(&self) -> Option<chrono::Duration> {
        self.tiers.as_ref().and_then(|tiers| tiers.gate.last_fetch_age())
    }

    /// Answers one intercepted request
    ///
    /// Tier order is fixed: endpoint requests go to the freshness gate;
    /// everything else tries the durable store, the ephemeral cache, the
    /// preloaded response the host may have raced for this navigation, and
    /// finally the network. Every request is answered with a response or a
    /// propagated fetch error, never left hanging and never a silent empty
    /// response.
    pub async fn intercept(
        &self,
        request: &CacheRequest,
        preload: Option<CachedResponse>,
    ) -> Result<CachedResponse, FetchError> {
        if self.config.is_endpoint(request.url()) {
            return match &self.tiers {
                Some(tiers) => tiers.gate.handle(self.fetcher.as_ref()).await,
                None => self.fetcher.fetch(request).await,
            };
        }

        if let Some(tiers) = &self.tiers {
            match tiers.durable.get(request.url()) {
                Ok(Some(payload)) => {
                    debug!("durable store hit: {}", request.url());
                    return Ok(CachedResponse::from_json(&payload));
                }
                Ok(None) => {}
                Err(err) => warn!("durable store lookup failed, falling through: {}", err),
            }

            match tiers.cache.lookup(request) {
                Ok(Some(response)) => {
                    debug!("cache hit: {}", request.url());
                    return Ok(response);
                }
                Ok(None) => {}
                Err(err) => warn!("cache lookup failed, falling through: {}", err),
            }
        }

        if let Some(response) = preload {
            debug!("answering from navigation preload: {}", request.url());
            self.persist_best_effort(request, &response);
            return Ok(response);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.persist_best_effort(request, &response);
                Ok(response)
            }
            Err(err) => {
                error!("network fetch failed for {}: {}", request.url(), err);
                Err(err)
            }
        }
    }

    /// Caches a response without letting a write failure affect the answer
    fn persist_best_effort(&self, request: &CacheRequest, response: &CachedResponse) {
        if let Some(tiers) = &self.tiers {
            if let Err(err) = tiers.cache.put(request, response) {
                warn!("failed to cache response for {}: {}", request.url(), err);
            }
        }
    }
}
