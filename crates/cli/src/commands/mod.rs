//! CLI commands for the funding-rate arbitrage engine.

pub mod run;
pub mod scan;
pub mod wallet_check;
pub mod wallet_setup;

pub use run::{run_engine, RunArgs};
pub use scan::{run_scan, ScanArgs};
pub use wallet_check::{run_wallet_check, WalletCheckArgs};
pub use wallet_setup::{run_wallet_setup, WalletSetupArgs};

use anyhow::Result;
use funding_arb_core::AppConfig;
use funding_arb_hyperliquid::{ExchangeGateway, HyperliquidClient, RateLimiter};
use std::sync::Arc;

/// Rate limiter, HTTP client and gateway wired from configuration.
///
/// # Errors
/// Returns an error if the HTTP client cannot be built.
pub fn build_gateway(config: &AppConfig) -> Result<Arc<ExchangeGateway>> {
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let client = HyperliquidClient::from_config(&config.exchange, limiter)?;
    tracing::info!(
        api_url = %config.exchange.api_url,
        min_interval_ms = config.rate_limit.min_interval_ms,
        max_per_minute = config.rate_limit.max_per_minute,
        "Exchange gateway configured"
    );
    Ok(Arc::new(ExchangeGateway::new(client, &config.exchange)))
}
