//! ratecache - offline-first caching layer for a currency-rate API
//!
//! Fronts a single remote exchange-rate endpoint with a durable key-value
//! store and a generation-tagged response cache, so a consumer keeps working
//! without network access and the remote API is called at most once per
//! refresh interval. The interceptor is the only entry point consumers use;
//! the stores are internal tiers.

pub mod cli;
pub mod config;
pub mod fetch;
pub mod gate;
pub mod generation;
pub mod http;
pub mod interceptor;
pub mod rates;
pub mod store;

pub use config::LayerConfig;
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use gate::{Freshness, FreshnessGate};
pub use generation::{GenerationManager, SweepReport};
pub use http::{CacheRequest, CachedResponse, Method};
pub use interceptor::RequestInterceptor;
pub use rates::{PinnedRates, RateTable};
pub use store::{CacheError, DurableStore, EphemeralCache, StoreError, LAST_FETCH_KEY};
