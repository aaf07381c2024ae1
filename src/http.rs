//! Request/response model shared by every caching tier
//!
//! The interceptor, the stores and the network seam all speak in terms of
//! these two types rather than any HTTP library's own, so that responses can
//! be persisted to disk and replayed byte-identically after a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP methods the caching layer distinguishes between
///
/// Only safe methods are ever cached; the variant list is deliberately short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Head => write!(f, "HEAD"),
        }
    }
}

/// An intercepted request, reduced to its cache identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRequest {
    /// Request method
    method: Method,
    /// Absolute request URL
    url: String,
}

impl CacheRequest {
    /// Creates a request with an explicit method
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    /// Creates a GET request, the common case for assets and the endpoint
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Returns the request URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Normalized cache key: method and URL
    ///
    /// Two requests with the same key are interchangeable for caching
    /// purposes and share one cache entry.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// A response as stored on disk and handed back to the consumer
///
/// Bodies are kept as raw bytes and serialized as base64 inside the JSON
/// cache entries, so binary assets survive the round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Raw response body
    #[serde(with = "body_encoding")]
    pub body: Vec<u8>,
    /// When this response was obtained from the network or synthesized
    pub fetched_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Creates a response from network-fetched parts
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            fetched_at: Utc::now(),
        }
    }

    /// Synthesizes a JSON response from a stored payload
    ///
    /// Used when the durable store answers a request: the payload was parsed
    /// long ago, so a fresh response object is rebuilt around it.
    pub fn from_json(payload: &serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: payload.to_string().into_bytes(),
            fetched_at: Utc::now(),
        }
    }

    /// Whether the status code is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the first header with the given name, case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses the body as JSON
    pub fn json_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Serde adapter storing response bodies as base64 strings
mod body_encoding {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_includes_method_and_url() {
        let get = CacheRequest::get("https://example.com/index.html");
        let head = CacheRequest::new(Method::Head, "https://example.com/index.html");
        assert_eq!(get.cache_key(), "GET https://example.com/index.html");
        assert_eq!(head.cache_key(), "HEAD https://example.com/index.html");
        assert_ne!(get.cache_key(), head.cache_key());
    }

    #[test]
    fn test_binary_body_survives_serialization() {
        let original = CachedResponse::new(
            200,
            vec![("content-type".to_string(), "image/png".to_string())],
            vec![0, 159, 146, 150, 255],
        );

        let json = serde_json::to_string(&original).expect("serialize should succeed");
        let restored: CachedResponse = serde_json::from_str(&json).expect("deserialize should succeed");

        assert_eq!(restored, original);
    }

    #[test]
    fn test_from_json_builds_success_response() {
        let payload = serde_json::json!({"base_code": "USD"});
        let response = CachedResponse::from_json(&payload);

        assert!(response.is_success());
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.json_payload().unwrap(), payload);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = CachedResponse::new(
            304,
            vec![("ETag".to_string(), "\"abc\"".to_string())],
            Vec::new(),
        );
        assert_eq!(response.header("etag"), Some("\"abc\""));
        assert!(!response.is_success());
    }
}
