use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::DataSource;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub const fn is_buy(self) -> bool {
        matches!(self, Self::Buy)
    }
}

/// An order the engine wants executed. `limit_price` already carries slippage and exchange
/// price rounding; orders are immediate-or-cancel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: String,
    pub asset_index: u32,
    pub side: OrderSide,
    pub size: Decimal,
    pub limit_price: Decimal,
    pub reduce_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderFill {
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub filled_size: Decimal,
    pub avg_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Open,
    Close,
}

impl TradeAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
        }
    }
}

/// One executed open or close, as persisted in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub action: TradeAction,
    pub price: Decimal,
    pub size: Decimal,
    pub leverage: u32,
    pub funding_rate: Decimal,
    pub profit: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub status: String,
}

/// A funding rate seen by the scanner, whether or not it led to a trade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FundingObservation {
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub funding_rate: Decimal,
    pub source: DataSource,
}
