//! Exchange-rate payload model
//!
//! Typed view of the rate endpoint's JSON payload. The freshness gate uses it
//! to validate a payload before persisting it; the CLI uses it to render
//! individual rates. Some local currencies never appear in the remote payload
//! and are carried as pinned rates instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur when parsing a rate payload
#[derive(Debug, Error)]
pub enum RateParseError {
    /// The payload is not the expected JSON shape
    #[error("failed to parse rate payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload parsed but carries no rates
    #[error("rate payload contains no conversion rates")]
    MissingRates,
}

/// Parsed rate payload from the distinguished endpoint
///
/// Field names follow the endpoint's own JSON; unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    /// Base currency the rates are quoted against
    pub base_code: String,
    /// Unix time of the provider's last update, when present
    #[serde(default)]
    pub time_last_update_unix: Option<i64>,
    /// Conversion rates keyed by currency code
    pub conversion_rates: BTreeMap<String, f64>,
}

impl RateTable {
    /// Parses a payload already decoded to JSON
    ///
    /// # Returns
    /// * `Ok(RateTable)` for a payload with at least one rate
    /// * `Err(RateParseError)` if the shape is wrong or the table is empty
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, RateParseError> {
        let table: RateTable = serde_json::from_value(payload.clone())?;
        if table.conversion_rates.is_empty() {
            return Err(RateParseError::MissingRates);
        }
        Ok(table)
    }

    /// Parses a raw response body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RateParseError> {
        let payload: serde_json::Value = serde_json::from_slice(bytes)?;
        Self::from_payload(&payload)
    }

    /// Returns the rate for a currency code, if quoted
    pub fn rate(&self, code: &str) -> Option<f64> {
        self.conversion_rates.get(code).copied()
    }
}

/// Fixed rates for currencies the remote payload does not quote
///
/// Presentation-side data: pins are applied when rendering, never persisted
/// into the rate record.
#[derive(Debug, Clone, Default)]
pub struct PinnedRates {
    rates: BTreeMap<String, f64>,
}

impl PinnedRates {
    /// Creates an empty pin set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pinned rate for a currency code
    pub fn pin(mut self, code: impl Into<String>, rate: f64) -> Self {
        self.rates.insert(code.into(), rate);
        self
    }

    /// Returns the pinned rate for a code, if any
    pub fn get(&self, code: &str) -> Option<f64> {
        self.rates.get(code).copied()
    }

    /// Resolves a rate, preferring the pin over the remote table
    pub fn resolve(&self, table: &RateTable, code: &str) -> Option<f64> {
        self.get(code).or_else(|| table.rate(code))
    }
}
