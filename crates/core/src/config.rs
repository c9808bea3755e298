use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub rate_limit: RateLimitConfig,
    pub strategy: StrategyConfig,
    pub execution: ExecutionConfig,
    pub ledger: LedgerConfig,
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeConfig {
    pub api_url: String,
    /// Per HTTP call bound; a timeout counts as a transient failure.
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// TTL of the batch funding/price snapshot.
    pub cache_ttl_secs: u64,
    pub instruments_cache_ttl_secs: u64,
    /// Degrade to labelled synthetic data when the exchange is unreachable.
    pub synthetic_fallback: bool,
    /// Synthetic values stay constant within one bucket of this many seconds.
    pub synthetic_bucket_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum spacing between requests. An open makes three requests inside the
    /// pre-settlement window, so two intervals must fit in it.
    pub min_interval_ms: u64,
    pub max_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub leverage: u32,
    /// Upper bound on margin committed to one position, in USDC.
    pub investment_cap: Decimal,
    /// Share of available margin committed to a position.
    pub margin_utilization: Decimal,
    /// Rates strictly below this (negative) value qualify.
    pub funding_threshold: Decimal,
    pub pre_settlement_secs: u32,
    pub post_settlement_secs: u32,
    /// Length of one settlement period; 60 puts a boundary on every minute.
    pub settlement_period_secs: u32,
    pub tick_interval_ms: u64,
    pub funding_periods_per_day: u32,
    /// Price tolerance applied to IOC limit orders.
    pub slippage: Decimal,
    pub min_order_notional: Decimal,
}

/// Execution mode for the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Signed orders against the real exchange (requires a wallet).
    Live,
    /// Simulated fills against quoted prices; no orders leave the process.
    #[default]
    Paper,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Allow decisions on synthetic market data. Only meant for demos and tests.
    pub allow_synthetic_data: bool,
    pub paper_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalletConfig {
    pub path: String,
    /// Environment variable consulted when the wallet file carries no encryption key.
    pub encryption_key_env: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.hyperliquid.xyz".to_string(),
            timeout_secs: 15,
            max_retries: 3,
            retry_delay_ms: 5_000,
            cache_ttl_secs: 30,
            instruments_cache_ttl_secs: 300,
            synthetic_fallback: true,
            synthetic_bucket_secs: 300,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1_000,
            max_per_minute: 20,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            leverage: 10,
            investment_cap: Decimal::from(100),
            margin_utilization: Decimal::new(9, 1),
            funding_threshold: Decimal::new(-1, 4),
            pre_settlement_secs: 5,
            post_settlement_secs: 5,
            settlement_period_secs: 60,
            tick_interval_ms: 1_000,
            funding_periods_per_day: 8,
            slippage: Decimal::new(1, 2),
            min_order_notional: Decimal::from(10),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            allow_synthetic_data: false,
            paper_balance: Decimal::from(1000),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://funding_arb.db?mode=rwc".to_string(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            path: "wallet.json".to_string(),
            encryption_key_env: "FUNDING_ARB_WALLET_KEY".to_string(),
        }
    }
}
