//! Network seam for the caching layer
//!
//! Every network access goes through the [`Fetcher`] trait so tests can
//! script responses without a server. The production implementation wraps a
//! shared `reqwest` client.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::http::{CacheRequest, CachedResponse, Method};

/// Errors surfaced by a network fetch
///
/// This is the only error kind the caching layer ever propagates to its
/// consumer; every storage failure is recovered internally as a cache miss.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or the transfer failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("unexpected status {status} from {url}")]
    Status {
        /// Requested URL
        url: String,
        /// Status code received
        status: u16,
    },
}

/// Issues a request against the real network
///
/// Object-safe so the interceptor can hold `Arc<dyn Fetcher>` and tests can
/// substitute a scripted double.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the request, returning the full response on success
    ///
    /// # Returns
    /// * `Ok(CachedResponse)` for a 2xx response
    /// * `Err(FetchError)` if the transfer fails or the status is non-success
    async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse, FetchError>;
}

/// Production [`Fetcher`] backed by `reqwest`
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a fresh HTTP client
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher reusing an existing HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse, FetchError> {
        let method = match request.method() {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
        };

        let response = self.client.request(method, request.url()).send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        let fetched = CachedResponse::new(status, headers, body);
        if !fetched.is_success() {
            return Err(FetchError::Status {
                url: request.url().to_string(),
                status,
            });
        }
        Ok(fetched)
    }
}
