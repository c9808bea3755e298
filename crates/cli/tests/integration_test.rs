//! End-to-end: exchange gateway over HTTP, paper venue, `SQLite` ledger and position engine.

use chrono::{TimeZone, Utc};
use funding_arb_core::{
    EngineError, EngineState, ExchangeConfig, PositionEngine, StrategyConfig, TickOutcome,
    TradingVenue,
};
use funding_arb_data::SqliteLedger;
use funding_arb_hyperliquid::{
    ExchangeGateway, HyperliquidClient, PaperVenue, RateLimiter, RetryPolicy,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> Arc<ExchangeGateway> {
    gateway_with(server, &ExchangeConfig::default())
}

fn gateway_with(server: &MockServer, config: &ExchangeConfig) -> Arc<ExchangeGateway> {
    let policy = RetryPolicy {
        max_retries: 1,
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    };
    let client =
        HyperliquidClient::new(server.uri(), Arc::new(RateLimiter::unlimited()), policy).unwrap();
    Arc::new(ExchangeGateway::new(client, config))
}

async fn ledger(dir: &tempfile::TempDir) -> (SqliteLedger, String) {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
    (SqliteLedger::connect(&url).await.unwrap(), url)
}

async fn mount_snapshot(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/info"))
        .and(body_partial_json(json!({"type": "metaAndAssetCtxs"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"universe": [
                {"name": "BTC", "szDecimals": 5, "maxLeverage": 50},
                {"name": "ETH", "szDecimals": 4, "maxLeverage": 25}
            ]},
            [
                {"funding": "-0.0003", "markPx": "45000.0"},
                {"funding": "0.0001", "markPx": "2800.5"}
            ]
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_paper_round_trip_is_recorded() {
    let server = MockServer::start().await;
    mount_snapshot(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let (ledger, url) = ledger(&dir).await;

    let gateway = gateway(&server);
    let venue = PaperVenue::new(gateway.clone(), dec!(1000), 10);
    let mut engine =
        PositionEngine::new(gateway, venue, ledger, StrategyConfig::default(), false).unwrap();

    let open_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 55).unwrap();
    let opened = engine.tick(open_at).await.unwrap();
    let TickOutcome::Opened(open) = opened else {
        panic!("expected an open, got {opened:?}");
    };
    assert_eq!(open.instrument, "BTC");
    assert_eq!(open.size, dec!(0.02222));
    assert_eq!(open.price, dec!(45000));
    assert_eq!(engine.venue().holding("BTC"), dec!(0.02222));

    let close_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 1, 2).unwrap();
    let closed = engine.tick(close_at).await.unwrap();
    let TickOutcome::Closed(close) = closed else {
        panic!("expected a close, got {closed:?}");
    };
    // Flat price: only the funding term, 45000 * (-0.0003 / 8)
    assert_eq!(close.profit, dec!(-1.6875));
    assert_eq!(close.balance_before, dec!(1000));
    assert_eq!(close.balance_after, dec!(998.3125));
    assert_eq!(engine.state(), &EngineState::Idle);
    assert_eq!(engine.venue().holding("BTC"), Decimal::ZERO);

    // A fresh connection sees everything the engine appended.
    let reader = SqliteLedger::connect(&url).await.unwrap();
    let trades = reader.recent_trades(10).await.unwrap();
    let actions: Vec<_> = trades.iter().map(|t| t.action.as_str()).collect();
    assert_eq!(actions, ["close", "open"]);
    assert_eq!(reader.realized_profit().await.unwrap(), dec!(-1.6875));
    assert_eq!(reader.funding_history("BTC").await.unwrap().len(), 1);
    assert!(reader.latest_balance().await.unwrap().is_some());
}

#[tokio::test]
async fn test_unreachable_exchange_never_trades_on_synthetic_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (ledger, url) = ledger(&dir).await;

    let gateway = gateway(&server);
    let venue = PaperVenue::new(gateway.clone(), dec!(1000), 10);
    let mut engine =
        PositionEngine::new(gateway, venue, ledger, StrategyConfig::default(), false).unwrap();

    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 56).unwrap();
    let err = engine.tick(at).await.unwrap_err();

    assert!(matches!(err, EngineError::SyntheticData(_)));
    assert_eq!(engine.state(), &EngineState::Idle);
    assert_eq!(engine.venue().name(), "paper");

    let reader = SqliteLedger::connect(&url).await.unwrap();
    assert!(reader.recent_trades(10).await.unwrap().is_empty());
    let btc = reader.funding_history("BTC").await.unwrap();
    assert!(!btc.is_empty());
    assert!(btc.iter().all(|row| row.source == "synthetic"));
}

#[tokio::test]
async fn test_fallback_instrument_data_never_sizes_an_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/info"))
        .and(body_partial_json(json!({"type": "metaAndAssetCtxs"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"universe": [{"name": "BTC", "szDecimals": 5, "maxLeverage": 3}]},
            [{"funding": "-0.0003", "markPx": "45000.0"}]
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/info"))
        .and(body_partial_json(json!({"type": "meta"})))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (ledger, url) = ledger(&dir).await;

    // The universe carried by the snapshot expires at once, so the next lookup hits `meta`.
    let config = ExchangeConfig {
        instruments_cache_ttl_secs: 0,
        ..ExchangeConfig::default()
    };
    let gateway = gateway_with(&server, &config);
    let venue = PaperVenue::new(gateway.clone(), dec!(1000), 10);
    let mut engine =
        PositionEngine::new(gateway, venue, ledger, StrategyConfig::default(), false).unwrap();

    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 55).unwrap();
    let err = engine.tick(at).await.unwrap_err();

    assert!(matches!(err, EngineError::SyntheticData("instrument")));
    assert_eq!(engine.state(), &EngineState::Idle);
    assert_eq!(engine.venue().holding("BTC"), Decimal::ZERO);

    let reader = SqliteLedger::connect(&url).await.unwrap();
    assert!(reader.recent_trades(10).await.unwrap().is_empty());
}
