//! Wire schemas for the Hyperliquid `/info` and `/exchange` endpoints.
//!
//! Every query kind has an explicit schema; a body that does not deserialize into it is treated
//! as a malformed response. Per-asset numeric fields that may be absent or unparsable are kept as
//! strings so that one bad asset context does not fail a whole batch.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Info requests
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InfoRequest {
    Meta,
    MetaAndAssetCtxs,
    #[serde(rename_all = "camelCase")]
    FundingHistory {
        coin: String,
        start_time: i64,
        end_time: i64,
    },
    CandleSnapshot {
        req: CandleRequest,
    },
    ClearinghouseState {
        user: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleRequest {
    pub coin: String,
    pub interval: String,
    pub start_time: i64,
    pub end_time: i64,
}

// =============================================================================
// Info responses
// =============================================================================

/// `meta` response: the perpetuals universe. Asset index is the position in `universe`.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<UniverseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniverseAsset {
    pub name: String,
    pub sz_decimals: u32,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    #[serde(default)]
    pub is_delisted: bool,
}

const fn default_max_leverage() -> u32 {
    1
}

/// One entry of the second element of `metaAndAssetCtxs`, index-aligned with the universe.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetContext {
    #[serde(default)]
    pub funding: Option<String>,
    #[serde(default)]
    pub mark_px: Option<String>,
}

impl AssetContext {
    /// Funding rate and mark price, if both are present and parse as decimals.
    #[must_use]
    pub fn funding_and_mark(&self) -> Option<(Decimal, Decimal)> {
        let funding = parse_decimal(self.funding.as_deref()?)?;
        let mark = parse_decimal(self.mark_px.as_deref()?)?;
        Some((funding, mark))
    }
}

/// `metaAndAssetCtxs` response: `[meta, [ctx, ...]]`.
pub type MetaAndAssetCtxs = (Meta, Vec<AssetContext>);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingHistoryEntry {
    pub coin: String,
    pub funding_rate: String,
    #[serde(default)]
    pub premium: Option<String>,
    pub time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candle {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "s")]
    pub coin: String,
    #[serde(rename = "c")]
    pub close: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    pub margin_summary: MarginSummaryWire,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummaryWire {
    pub account_value: Decimal,
    pub total_margin_used: Decimal,
}

// =============================================================================
// Exchange requests
// =============================================================================

/// The signed `order` action. Field names follow the exchange's compact wire format.
#[derive(Debug, Clone, Serialize)]
pub struct OrderAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub orders: Vec<OrderWire>,
    pub grouping: &'static str,
}

impl OrderAction {
    #[must_use]
    pub fn single(order: OrderWire) -> Self {
        Self {
            kind: "order",
            orders: vec![order],
            grouping: "na",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWire {
    /// Asset index.
    pub a: u32,
    /// Is buy.
    pub b: bool,
    /// Limit price.
    pub p: String,
    /// Size.
    pub s: String,
    /// Reduce only.
    pub r: bool,
    pub t: OrderType,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderType {
    pub limit: LimitOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitOrder {
    pub tif: &'static str,
}

impl OrderType {
    #[must_use]
    pub const fn immediate_or_cancel() -> Self {
        Self {
            limit: LimitOrder { tif: "Ioc" },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureWire {
    pub r: String,
    pub s: String,
    pub v: u64,
}

// =============================================================================
// Exchange responses
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", content = "response", rename_all = "lowercase")]
pub enum ExchangeResponse {
    Ok(ExchangeOk),
    Err(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeOk {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<StatusData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub statuses: Vec<OrderStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Filled(FilledStatus),
    Resting(RestingStatus),
    Error(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilledStatus {
    pub total_sz: Decimal,
    pub avg_px: Decimal,
    pub oid: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestingStatus {
    pub oid: u64,
}

/// Parses an exchange decimal string, accepting scientific notation.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Renders a decimal the way the exchange expects in order fields: no trailing zeros.
#[must_use]
pub fn wire_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}
