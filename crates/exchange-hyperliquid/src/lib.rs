pub mod client;
pub mod execution;
pub mod gateway;
pub mod models;
pub mod paper_execution;
pub mod rate_limiter;
pub mod signing;
pub mod synthetic;
pub mod wallet;

pub use client::{HyperliquidClient, RetryPolicy};
pub use execution::LiveVenue;
pub use gateway::ExchangeGateway;
pub use paper_execution::PaperVenue;
pub use rate_limiter::{RateLimitState, RateLimiter};
pub use synthetic::SyntheticMarket;
pub use wallet::{load_signer, KeyCipher, WalletError, WalletFile, WalletSigner};
