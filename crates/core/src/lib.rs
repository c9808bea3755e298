pub mod config;
pub mod config_loader;
pub mod engine;
pub mod error;
pub mod events;
pub mod market;
pub mod position;
pub mod position_sizing;
pub mod scanner;
pub mod schedule;
pub mod traits;

pub use config::{
    AppConfig, ExchangeConfig, ExecutionConfig, ExecutionMode, LedgerConfig, RateLimitConfig,
    StrategyConfig, WalletConfig,
};
pub use config_loader::ConfigLoader;
pub use engine::{EngineState, PositionEngine, TickOutcome};
pub use error::{EngineError, GatewayError, OrderError};
pub use events::{FundingObservation, OrderFill, OrderRequest, OrderSide, TradeAction, TradeRecord};
pub use market::{DataSource, InstrumentMeta, InstrumentQuote, MarginSummary, Sourced};
pub use position::Position;
pub use scanner::OpportunityScanner;
pub use schedule::{SettlementSchedule, WindowPhase};
pub use traits::{Ledger, MarketDataSource, TradingVenue};
