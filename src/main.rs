//! ratecache - offline-first exchange-rate viewer
//!
//! Thin consumer of the caching layer. Every command drives the interceptor
//! (activate, install, intercept) and renders what comes back; none of them
//! reads or writes the stores directly.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use ratecache::cli::{validate_currency, Cli, Command};
use ratecache::{
    CacheRequest, Freshness, HttpFetcher, PinnedRates, RateTable, RequestInterceptor,
};

/// Local-currency rate the remote payload does not quote
const ZIG_TO_USD: f64 = 0.0727;

/// Currencies rendered when none are requested
const DEFAULT_CURRENCIES: [&str; 5] = ["GBP", "EUR", "NAD", "MZN", "ZiG"];

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = cli.layer_config()?;
    if let Command::Warm { assets } = &cli.command {
        config = config.precache_assets(assets.clone());
    }
    let interceptor = RequestInterceptor::new(config.clone(), Arc::new(HttpFetcher::new()));

    match cli.command {
        Command::Rates { currencies } => {
            interceptor.on_activate();

            let codes: Vec<String> = if currencies.is_empty() {
                DEFAULT_CURRENCIES.iter().map(|c| c.to_string()).collect()
            } else {
                currencies
            };
            for code in &codes {
                validate_currency(code)?;
            }

            let request = CacheRequest::get(&config.endpoint_url);
            let response = interceptor.intercept(&request, None).await?;
            let table = RateTable::from_bytes(&response.body)?;
            let pins = PinnedRates::new().pin("ZiG", ZIG_TO_USD);

            println!("Rates against 1 {}", table.base_code);
            for code in &codes {
                match pins.resolve(&table, code) {
                    Some(rate) => println!("{:<5} {:.4}", code, rate),
                    None => println!("{:<5} (not quoted)", code),
                }
            }
        }
        Command::Warm { .. } => {
            let report = interceptor.on_activate();
            interceptor.on_install().await;
            println!(
                "warmed {} asset(s), collected {} stale generation(s)",
                config.precache_assets.len(),
                report.removed.len()
            );
        }
        Command::Status => {
            let state = match interceptor.endpoint_freshness() {
                Freshness::Fresh => "fresh",
                Freshness::Stale => "stale",
            };
            println!("generation: {}", config.generation);
            println!("endpoint:   {}", config.endpoint_url);
            println!("freshness:  {}", state);
            match interceptor.endpoint_age() {
                Some(age) => println!(
                    "last fetch: {}h {}m ago",
                    age.num_hours(),
                    age.num_minutes() % 60
                ),
                None => println!("last fetch: never"),
            }
        }
    }
    Ok(())
}
