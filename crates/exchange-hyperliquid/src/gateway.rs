//! Market data and account access on top of [`HyperliquidClient`].
//!
//! The batch `metaAndAssetCtxs` snapshot is the single source for funding rates and mark prices
//! and is cached briefly; the instrument universe is cached longer. Only live data is cached.
//! When a market-data call fails transiently and synthetic fallback is enabled, labelled
//! synthetic data is returned instead. Account and order calls never fall back.

use crate::client::HyperliquidClient;
use crate::models::{
    parse_decimal, Candle, CandleRequest, ClearinghouseState, ExchangeResponse, FundingHistoryEntry,
    InfoRequest, Meta, MetaAndAssetCtxs,
};
use crate::synthetic::{SyntheticMarket, FALLBACK_UNIVERSE};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use funding_arb_core::config::ExchangeConfig;
use funding_arb_core::error::GatewayError;
use funding_arb_core::market::{InstrumentMeta, InstrumentQuote, MarginSummary, Sourced};
use funding_arb_core::traits::MarketDataSource;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Cached<T> {
    fetched_at: Instant,
    value: T,
}

impl<T: Clone> Cached<T> {
    fn fresh(&self, ttl: Duration) -> Option<T> {
        (self.fetched_at.elapsed() < ttl).then(|| self.value.clone())
    }
}

#[derive(Default)]
struct GatewayCache {
    snapshot: Option<Cached<Vec<InstrumentQuote>>>,
    universe: Option<Cached<Vec<InstrumentMeta>>>,
}

pub struct ExchangeGateway {
    client: HyperliquidClient,
    synthetic: SyntheticMarket,
    cache: Mutex<GatewayCache>,
    snapshot_ttl: Duration,
    universe_ttl: Duration,
    synthetic_fallback: bool,
}

impl ExchangeGateway {
    #[must_use]
    pub fn new(client: HyperliquidClient, config: &ExchangeConfig) -> Self {
        Self {
            client,
            synthetic: SyntheticMarket::new(config.synthetic_bucket_secs),
            cache: Mutex::new(GatewayCache::default()),
            snapshot_ttl: Duration::from_secs(config.cache_ttl_secs),
            universe_ttl: Duration::from_secs(config.instruments_cache_ttl_secs),
            synthetic_fallback: config.synthetic_fallback,
        }
    }

    // =========================================================================
    // Universe
    // =========================================================================

    /// Names of all tradable perpetuals.
    ///
    /// # Errors
    ///
    /// Returns the gateway error when the listing fails and no fallback applies.
    pub async fn list_instruments(&self) -> Result<Sourced<Vec<String>>, GatewayError> {
        Ok(self
            .instruments_meta()
            .await?
            .map(|metas| metas.into_iter().map(|m| m.symbol).collect()))
    }

    /// Trading parameters of all tradable perpetuals.
    ///
    /// # Errors
    ///
    /// Returns the gateway error when the listing fails and no fallback applies.
    pub async fn instruments_meta(&self) -> Result<Sourced<Vec<InstrumentMeta>>, GatewayError> {
        if let Some(universe) = self.cached_universe() {
            return Ok(Sourced::live(universe));
        }

        match self.client.info::<Meta>(&InfoRequest::Meta).await {
            Ok(meta) => {
                let universe = universe_from(&meta);
                self.store_universe(universe.clone());
                Ok(Sourced::live(universe))
            }
            Err(e) => self.fallback(e, "instruments", || self.synthetic.universe()),
        }
    }

    // =========================================================================
    // Funding and prices
    // =========================================================================

    /// Funding rate and mark price of every instrument with a complete asset context.
    ///
    /// # Errors
    ///
    /// Returns the gateway error when the snapshot fails and no fallback applies.
    pub async fn snapshot(&self) -> Result<Sourced<Vec<InstrumentQuote>>, GatewayError> {
        match self.live_snapshot().await {
            Ok(quotes) => Ok(Sourced::live(quotes)),
            Err(e) => {
                let symbols = self.fallback_symbols();
                let now = Utc::now();
                self.fallback(e, "funding snapshot", || {
                    self.synthetic.quotes(symbols.iter().map(String::as_str), now)
                })
            }
        }
    }

    /// # Errors
    ///
    /// Returns the gateway error when the snapshot fails and no fallback applies.
    pub async fn funding_rates(&self) -> Result<Sourced<HashMap<String, Decimal>>, GatewayError> {
        Ok(self.snapshot().await?.map(|quotes| {
            quotes
                .into_iter()
                .map(|q| (q.symbol, q.funding_rate))
                .collect()
        }))
    }

    /// # Errors
    ///
    /// Returns the gateway error when the snapshot fails and no fallback applies.
    pub async fn prices(&self) -> Result<Sourced<HashMap<String, Decimal>>, GatewayError> {
        Ok(self.snapshot().await?.map(|quotes| {
            quotes
                .into_iter()
                .map(|q| (q.symbol, q.mark_price))
                .collect()
        }))
    }

    /// Funding rate of one instrument: from the batch snapshot, else the latest entry of the
    /// last hour of funding history. `None` when the exchange knows no rate for it.
    ///
    /// # Errors
    ///
    /// Returns the gateway error when both sources fail and no fallback applies.
    pub async fn funding_rate(&self, symbol: &str) -> Result<Sourced<Option<Decimal>>, GatewayError> {
        let live = match self.live_snapshot().await {
            Ok(quotes) => match quotes.iter().find(|q| q.symbol == symbol) {
                Some(quote) => Ok(Some(quote.funding_rate)),
                None => self.latest_funding(symbol).await,
            },
            Err(e) if e.is_transient() => self.latest_funding(symbol).await,
            Err(e) => Err(e),
        };

        match live {
            Ok(rate) => Ok(Sourced::live(rate)),
            Err(e) => {
                let now = Utc::now();
                self.fallback(e, "funding rate", || Some(self.synthetic.funding_rate(symbol, now)))
            }
        }
    }

    /// Mark price of one instrument: from the batch snapshot, else the close of the latest
    /// one-minute candle around now.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MalformedRequest`] if the exchange has no price for `symbol`, or
    /// the gateway error when both sources fail and no fallback applies.
    pub async fn price(&self, symbol: &str) -> Result<Sourced<Decimal>, GatewayError> {
        let live = match self.live_snapshot().await {
            Ok(quotes) => match quotes.iter().find(|q| q.symbol == symbol) {
                Some(quote) => Ok(Some(quote.mark_price)),
                None => self.latest_close(symbol).await,
            },
            Err(e) if e.is_transient() => self.latest_close(symbol).await,
            Err(e) => Err(e),
        };

        match live {
            Ok(Some(price)) => Ok(Sourced::live(price)),
            Ok(None) => Err(GatewayError::MalformedRequest(format!(
                "no price available for {symbol}"
            ))),
            Err(e) => {
                let now = Utc::now();
                self.fallback(e, "price", || self.synthetic.price(symbol, now))
            }
        }
    }

    // =========================================================================
    // Account and orders (never synthetic)
    // =========================================================================

    /// # Errors
    ///
    /// Returns the gateway error; there is no fallback for account data.
    pub async fn margin_summary(&self, address: &str) -> Result<MarginSummary, GatewayError> {
        let state: ClearinghouseState = self
            .client
            .info(&InfoRequest::ClearinghouseState {
                user: address.to_string(),
            })
            .await?;

        Ok(MarginSummary {
            account_value: state.margin_summary.account_value,
            total_margin_used: state.margin_summary.total_margin_used,
        })
    }

    /// # Errors
    ///
    /// Returns the gateway error; orders are never retried into synthetic results.
    pub async fn post_exchange(&self, body: &serde_json::Value) -> Result<ExchangeResponse, GatewayError> {
        self.client.exchange(body).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn live_snapshot(&self) -> Result<Vec<InstrumentQuote>, GatewayError> {
        if let Some(quotes) = self.cached_snapshot() {
            return Ok(quotes);
        }

        let (meta, contexts): MetaAndAssetCtxs =
            self.client.info(&InfoRequest::MetaAndAssetCtxs).await?;
        let observed_at = Utc::now();

        let mut quotes = Vec::with_capacity(meta.universe.len());
        for (asset, ctx) in meta.universe.iter().zip(&contexts) {
            if asset.is_delisted {
                continue;
            }
            match ctx.funding_and_mark() {
                Some((funding_rate, mark_price)) => quotes.push(InstrumentQuote {
                    symbol: asset.name.clone(),
                    funding_rate,
                    mark_price,
                    observed_at,
                }),
                None => debug!(instrument = %asset.name, "Dropping incomplete asset context"),
            }
        }
        if meta.universe.len() != contexts.len() {
            warn!(
                universe = meta.universe.len(),
                contexts = contexts.len(),
                "Universe and asset contexts differ in length"
            );
        }

        let universe = universe_from(&meta);
        {
            let mut cache = self.cache.lock();
            cache.snapshot = Some(Cached {
                fetched_at: Instant::now(),
                value: quotes.clone(),
            });
            cache.universe = Some(Cached {
                fetched_at: Instant::now(),
                value: universe,
            });
        }

        Ok(quotes)
    }

    async fn latest_funding(&self, symbol: &str) -> Result<Option<Decimal>, GatewayError> {
        let now = Utc::now();
        let history: Vec<FundingHistoryEntry> = self
            .client
            .info(&InfoRequest::FundingHistory {
                coin: symbol.to_string(),
                start_time: (now - ChronoDuration::hours(1)).timestamp_millis(),
                end_time: now.timestamp_millis(),
            })
            .await?;

        Ok(history
            .iter()
            .max_by_key(|entry| entry.time)
            .and_then(|entry| parse_decimal(&entry.funding_rate)))
    }

    async fn latest_close(&self, symbol: &str) -> Result<Option<Decimal>, GatewayError> {
        let now: DateTime<Utc> = Utc::now();
        let candles: Vec<Candle> = self
            .client
            .info(&InfoRequest::CandleSnapshot {
                req: CandleRequest {
                    coin: symbol.to_string(),
                    interval: "1m".to_string(),
                    start_time: (now - ChronoDuration::seconds(60)).timestamp_millis(),
                    end_time: (now + ChronoDuration::seconds(60)).timestamp_millis(),
                },
            })
            .await?;

        Ok(candles
            .iter()
            .max_by_key(|candle| candle.open_time)
            .and_then(|candle| parse_decimal(&candle.close)))
    }

    fn fallback<T>(
        &self,
        error: GatewayError,
        what: &str,
        synthesize: impl FnOnce() -> T,
    ) -> Result<Sourced<T>, GatewayError> {
        if self.synthetic_fallback && error.is_transient() {
            warn!(error = %error, data = what, "Exchange unreachable, serving synthetic data");
            Ok(Sourced::synthetic(synthesize()))
        } else {
            Err(error)
        }
    }

    fn cached_snapshot(&self) -> Option<Vec<InstrumentQuote>> {
        self.cache
            .lock()
            .snapshot
            .as_ref()
            .and_then(|c| c.fresh(self.snapshot_ttl))
    }

    fn cached_universe(&self) -> Option<Vec<InstrumentMeta>> {
        self.cache
            .lock()
            .universe
            .as_ref()
            .and_then(|c| c.fresh(self.universe_ttl))
    }

    fn store_universe(&self, universe: Vec<InstrumentMeta>) {
        self.cache.lock().universe = Some(Cached {
            fetched_at: Instant::now(),
            value: universe,
        });
    }

    /// Symbols for synthetic quotes: the last known live universe, else the fallback list.
    fn fallback_symbols(&self) -> Vec<String> {
        let cache = self.cache.lock();
        match &cache.universe {
            Some(cached) if !cached.value.is_empty() => {
                cached.value.iter().map(|m| m.symbol.clone()).collect()
            }
            _ => FALLBACK_UNIVERSE.iter().map(ToString::to_string).collect(),
        }
    }
}

fn universe_from(meta: &Meta) -> Vec<InstrumentMeta> {
    meta.universe
        .iter()
        .zip(0u32..)
        .filter(|(asset, _)| !asset.is_delisted)
        .map(|(asset, asset_index)| InstrumentMeta {
            symbol: asset.name.clone(),
            asset_index,
            sz_decimals: asset.sz_decimals,
            max_leverage: asset.max_leverage,
        })
        .collect()
}

#[async_trait]
impl MarketDataSource for ExchangeGateway {
    async fn funding_quotes(&self) -> Result<Sourced<Vec<InstrumentQuote>>, GatewayError> {
        self.snapshot().await
    }

    async fn price(&self, symbol: &str) -> Result<Sourced<Decimal>, GatewayError> {
        Self::price(self, symbol).await
    }

    async fn instrument(
        &self,
        symbol: &str,
    ) -> Result<Sourced<Option<InstrumentMeta>>, GatewayError> {
        Ok(self
            .instruments_meta()
            .await?
            .map(|metas| metas.into_iter().find(|m| m.symbol == symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use crate::rate_limiter::RateLimiter;
    use funding_arb_core::market::DataSource;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer, synthetic_fallback: bool) -> ExchangeGateway {
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        };
        let client =
            HyperliquidClient::new(server.uri(), Arc::new(RateLimiter::unlimited()), policy).unwrap();
        let config = ExchangeConfig {
            synthetic_fallback,
            ..ExchangeConfig::default()
        };
        ExchangeGateway::new(client, &config)
    }

    fn snapshot_body() -> serde_json::Value {
        json!([
            {"universe": [
                {"name": "BTC", "szDecimals": 5, "maxLeverage": 50},
                {"name": "ETH", "szDecimals": 4, "maxLeverage": 25},
                {"name": "SOL", "szDecimals": 2, "maxLeverage": 20},
                {"name": "OLD", "szDecimals": 0, "maxLeverage": 3, "isDelisted": true}
            ]},
            [
                {"funding": "-0.0003", "markPx": "45000.0"},
                {"funding": "0.0001", "markPx": "2800.5"},
                {"funding": "-0.0002"},
                {"funding": "0.0", "markPx": "1.0"}
            ]
        ])
    }

    async fn mount_snapshot(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_partial_json(json!({"type": "metaAndAssetCtxs"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_snapshot_drops_incomplete_and_delisted() {
        let server = MockServer::start().await;
        mount_snapshot(&server, 1).await;

        let snapshot = gateway(&server, true).snapshot().await.unwrap();

        assert_eq!(snapshot.source, DataSource::Live);
        let symbols: Vec<_> = snapshot.value.iter().map(|q| q.symbol.as_str()).collect();
        assert_eq!(symbols, ["BTC", "ETH"]);
        assert_eq!(snapshot.value[0].funding_rate, dec!(-0.0003));
        assert_eq!(snapshot.value[1].mark_price, dec!(2800.5));
    }

    #[tokio::test]
    async fn test_snapshot_is_cached() {
        let server = MockServer::start().await;
        mount_snapshot(&server, 1).await;
        let gateway = gateway(&server, true);

        let rates = gateway.funding_rates().await.unwrap();
        let prices = gateway.prices().await.unwrap();
        let btc = gateway.price("BTC").await.unwrap();

        assert_eq!(rates.value.get("BTC"), Some(&dec!(-0.0003)));
        assert_eq!(prices.value.get("ETH"), Some(&dec!(2800.5)));
        assert_eq!(btc, Sourced::live(dec!(45000.0)));
    }

    #[tokio::test]
    async fn test_universe_comes_from_snapshot_cache() {
        let server = MockServer::start().await;
        mount_snapshot(&server, 1).await;
        let gateway = gateway(&server, true);

        gateway.snapshot().await.unwrap();
        let eth = gateway.instrument("ETH").await.unwrap();
        assert!(eth.is_live());
        let eth = eth.value.unwrap();
        let names = gateway.list_instruments().await.unwrap();

        assert_eq!(eth.asset_index, 1);
        assert_eq!(eth.sz_decimals, 4);
        assert_eq!(eth.max_leverage, 25);
        assert_eq!(names.value, ["BTC", "ETH", "SOL"]);
        assert!(gateway.instrument("OLD").await.unwrap().value.is_none());
    }

    #[tokio::test]
    async fn test_per_instrument_fallbacks() {
        let server = MockServer::start().await;
        mount_snapshot(&server, 1).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"type": "fundingHistory", "coin": "SOL"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"coin": "SOL", "fundingRate": "-0.00015", "premium": "0.0", "time": 1_700_000_000_000_i64},
                {"coin": "SOL", "fundingRate": "-0.00025", "premium": "0.0", "time": 1_700_000_360_000_i64}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"type": "candleSnapshot", "req": {"coin": "SOL", "interval": "1m"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"t": 1, "T": 2, "s": "SOL", "i": "1m", "o": "119", "c": "120.5", "h": "121", "l": "118", "v": "10", "n": 4},
                {"t": 3, "T": 4, "s": "SOL", "i": "1m", "o": "120.5", "c": "121.25", "h": "122", "l": "120", "v": "8", "n": 2}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        let gateway = gateway(&server, true);

        assert_eq!(gateway.funding_rate("BTC").await.unwrap(), Sourced::live(Some(dec!(-0.0003))));
        assert_eq!(gateway.funding_rate("SOL").await.unwrap(), Sourced::live(Some(dec!(-0.00025))));
        assert_eq!(gateway.price("SOL").await.unwrap(), Sourced::live(dec!(121.25)));
    }

    #[tokio::test]
    async fn test_unreachable_exchange_serves_synthetic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let gateway = gateway(&server, true);

        let snapshot = gateway.snapshot().await.unwrap();
        assert_eq!(snapshot.source, DataSource::Synthetic);
        let symbols: Vec<_> = snapshot.value.iter().map(|q| q.symbol.as_str()).collect();
        assert_eq!(symbols, FALLBACK_UNIVERSE);

        let price = gateway.price("ETH").await.unwrap();
        assert_eq!(price.source, DataSource::Synthetic);

        let universe = gateway.list_instruments().await.unwrap();
        assert_eq!(universe.source, DataSource::Synthetic);
        assert_eq!(universe.value.len(), 8);

        // Synthetic results are never cached as live data
        let again = gateway.funding_rates().await.unwrap();
        assert_eq!(again.source, DataSource::Synthetic);
    }

    #[tokio::test]
    async fn test_instrument_from_fallback_universe_is_tagged_synthetic() {
        let server = MockServer::start().await;
        mount_snapshot(&server, 1).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"type": "meta"})))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let policy = RetryPolicy {
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        };
        let client =
            HyperliquidClient::new(server.uri(), Arc::new(RateLimiter::unlimited()), policy).unwrap();
        let config = ExchangeConfig {
            instruments_cache_ttl_secs: 0,
            ..ExchangeConfig::default()
        };
        let gateway = ExchangeGateway::new(client, &config);

        // The snapshot is live but its universe expires immediately, so `meta` is asked next.
        assert!(gateway.snapshot().await.unwrap().is_live());
        let btc = gateway.instrument("BTC").await.unwrap();

        assert_eq!(btc.source, DataSource::Synthetic);
    }

    #[tokio::test]
    async fn test_fallback_disabled_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway(&server, false).snapshot().await.unwrap_err();
        assert!(matches!(err, GatewayError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_malformed_response_never_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"universe": "nope"})))
            .mount(&server)
            .await;

        let err = gateway(&server, true).snapshot().await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_margin_summary_never_synthetic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"type": "clearinghouseState", "user": "0xabc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "marginSummary": {"accountValue": "1250.5", "totalMarginUsed": "200.5", "totalNtlPos": "0"},
                "withdrawable": "1050.0"
            })))
            .mount(&server)
            .await;
        let gateway = gateway(&server, true);

        let summary = gateway.margin_summary("0xabc").await.unwrap();
        assert_eq!(summary.available(), dec!(1050.0));

        let err = gateway.margin_summary("0xother").await.unwrap_err();
        assert!(matches!(err, GatewayError::Http { status: 404, .. }));
    }
}
