use crate::error::{GatewayError, OrderError};
use crate::events::{FundingObservation, OrderFill, OrderRequest, TradeRecord};
use crate::market::{InstrumentMeta, InstrumentQuote, MarginSummary, Sourced};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Read side of the exchange as seen by the position engine.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Funding rate and mark price for every listed instrument.
    async fn funding_quotes(&self) -> Result<Sourced<Vec<InstrumentQuote>>, GatewayError>;

    async fn price(&self, symbol: &str) -> Result<Sourced<Decimal>, GatewayError>;

    /// Trading parameters of `symbol`, tagged with the source of the universe they came from.
    async fn instrument(
        &self,
        symbol: &str,
    ) -> Result<Sourced<Option<InstrumentMeta>>, GatewayError>;
}

/// Account and order side of the exchange.
#[async_trait]
pub trait TradingVenue: Send + Sync {
    async fn margin_summary(&self) -> Result<MarginSummary, GatewayError>;

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderFill, OrderError>;

    fn name(&self) -> &str;
}

/// Append-only trade and observation store. There are no update or delete operations.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record_trade(&self, record: &TradeRecord) -> Result<()>;

    /// Records a single live observation stamped with the current time.
    async fn record_funding(&self, symbol: &str, funding_rate: Decimal) -> Result<()>;

    async fn record_funding_batch(&self, observations: &[FundingObservation]) -> Result<()>;

    async fn record_balance(&self, balance: Decimal, available_margin: Decimal) -> Result<()>;
}

#[async_trait]
impl<T: MarketDataSource + ?Sized> MarketDataSource for Arc<T> {
    async fn funding_quotes(&self) -> Result<Sourced<Vec<InstrumentQuote>>, GatewayError> {
        (**self).funding_quotes().await
    }

    async fn price(&self, symbol: &str) -> Result<Sourced<Decimal>, GatewayError> {
        (**self).price(symbol).await
    }

    async fn instrument(
        &self,
        symbol: &str,
    ) -> Result<Sourced<Option<InstrumentMeta>>, GatewayError> {
        (**self).instrument(symbol).await
    }
}

#[async_trait]
impl<T: TradingVenue + ?Sized> TradingVenue for Arc<T> {
    async fn margin_summary(&self) -> Result<MarginSummary, GatewayError> {
        (**self).margin_summary().await
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderFill, OrderError> {
        (**self).submit_order(order).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    async fn record_trade(&self, record: &TradeRecord) -> Result<()> {
        (**self).record_trade(record).await
    }

    async fn record_funding(&self, symbol: &str, funding_rate: Decimal) -> Result<()> {
        (**self).record_funding(symbol, funding_rate).await
    }

    async fn record_funding_batch(&self, observations: &[FundingObservation]) -> Result<()> {
        (**self).record_funding_batch(observations).await
    }

    async fn record_balance(&self, balance: Decimal, available_margin: Decimal) -> Result<()> {
        (**self).record_balance(balance, available_margin).await
    }
}
