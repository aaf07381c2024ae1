//! Command-line interface parsing for ratecache
//!
//! The CLI is the thin consumer of the caching layer: it issues requests
//! through the interceptor and renders the answers. It never touches the
//! stores directly.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::LayerConfig;

/// Generation tag shipped with this build; bump on deploy
const DEFAULT_GENERATION: &str = "rates-v1";

/// Rate provider origin (keyless endpoint of exchangerate-api)
const DEFAULT_PROVIDER: &str = "https://open.er-api.com";

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// No XDG cache directory and no --root override
    #[error("no cache directory could be determined; pass --root explicitly")]
    NoCacheDir,

    /// A currency code argument is not plausible
    #[error("invalid currency code: '{0}' (expected 2-5 letters, e.g. EUR)")]
    InvalidCurrency(String),
}

/// ratecache - offline-first cache for currency exchange rates
#[derive(Parser, Debug)]
#[command(name = "ratecache")]
#[command(about = "Offline-first cache fronting a currency exchange-rate API")]
#[command(version)]
pub struct Cli {
    /// Cache generation tag; data under any other tag is collected on activation
    #[arg(long, default_value = DEFAULT_GENERATION)]
    pub generation: String,

    /// Origin whose responses may be cached
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    pub origin: String,

    /// Base currency the rates are quoted against
    #[arg(long, default_value = "USD")]
    pub base: String,

    /// Storage root directory (defaults to the XDG cache directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of the CLI consumer
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show exchange rates, served from the cache while fresh
    Rates {
        /// Currency codes to display (defaults to a built-in selection)
        currencies: Vec<String>,
    },
    /// Prefetch assets into the cache (the install step)
    Warm {
        /// Asset URLs or origin-relative paths to prefetch
        assets: Vec<String>,
    },
    /// Show generation, freshness state and last-fetch age
    Status,
}

impl Cli {
    /// The distinguished endpoint URL for the chosen base currency
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/v6/latest/{}",
            self.origin.trim_end_matches('/'),
            self.base
        )
    }

    /// Builds the layer configuration from the parsed arguments
    ///
    /// # Returns
    /// * `Ok(LayerConfig)` rooted at `--root` or the XDG cache directory
    /// * `Err(CliError)` if the base currency is implausible or no storage
    ///   root can be determined
    pub fn layer_config(&self) -> Result<LayerConfig, CliError> {
        validate_currency(&self.base)?;
        let config = match &self.root {
            Some(root) => LayerConfig::with_root(
                &self.generation,
                &self.origin,
                self.endpoint_url(),
                root.clone(),
            ),
            None => LayerConfig::new(&self.generation, &self.origin, self.endpoint_url())
                .ok_or(CliError::NoCacheDir)?,
        };
        Ok(config)
    }
}

/// Checks that a currency code argument is plausible
///
/// # Arguments
/// * `code` - The currency code from the CLI
///
/// # Returns
/// * `Ok(())` for a 2-5 letter alphabetic code
/// * `Err(CliError::InvalidCurrency)` otherwise
pub fn validate_currency(code: &str) -> Result<(), CliError> {
    let plausible = (2..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic());
    if plausible {
        Ok(())
    } else {
        Err(CliError::InvalidCurrency(code.to_string()))
    }
}
