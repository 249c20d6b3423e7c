//! Strategy engine driven by the REST client against a mock exchange

use std::sync::Arc;
use std::time::Duration;

use bybit_bot::bybit::BybitClient;
use bybit_bot::config::{EngineConfig, ExchangeConfig, StrategyConfig};
use bybit_bot::execution::PaperEngine;
use bybit_bot::notify::TelegramNotifier;
use bybit_bot::risk::{RiskLimits, RiskManager};
use bybit_bot::strategy::{AnalysisError, MarketFeed, RunnerContext, StrategyEngine, UpdateOutcome};
use mockito::Matcher;
use rust_decimal_macros::dec;
use tokio::sync::{watch, Mutex};

const TICKER_BODY: &str = r#"{
    "retCode": 0,
    "retMsg": "OK",
    "result": {
        "category": "spot",
        "list": [{"symbol": "BTCUSDT", "lastPrice": "42000.5", "bid1Price": "42000", "ask1Price": "42001",
                  "turnover24h": "1000000", "volume24h": "25", "price24hPcnt": "0.01"}]
    },
    "time": 1700000000000
}"#;

const KLINE_BODY: &str = r#"{
    "retCode": 0,
    "retMsg": "OK",
    "result": {
        "symbol": "BTCUSDT",
        "category": "spot",
        "list": [
            ["1700007200000", "41900", "42100", "41800", "42000.5", "10", "420000"],
            ["1700003600000", "41800", "42000", "41700", "41900", "12", "500000"],
            ["1700000000000", "41700", "41900", "41600", "41800", "9", "380000"]
        ]
    },
    "time": 1700000000000
}"#;

async fn mock_exchange(server: &mut mockito::ServerGuard) -> (mockito::Mock, mockito::Mock) {
    let tickers = server
        .mock("GET", "/v5/market/tickers")
        .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
        .with_body(TICKER_BODY)
        .create_async()
        .await;
    let klines = server
        .mock("GET", "/v5/market/kline")
        .match_query(Matcher::UrlEncoded("interval".into(), "60".into()))
        .with_body(KLINE_BODY)
        .create_async()
        .await;
    (tickers, klines)
}

fn client(server: &mockito::ServerGuard) -> Arc<BybitClient> {
    let config = ExchangeConfig {
        timeout_secs: 5,
        cache_ttl_secs: 0,
        ..ExchangeConfig::default()
    };
    Arc::new(
        BybitClient::new(&config, None)
            .unwrap()
            .with_base_url(server.url())
            .with_retry_delay(Duration::from_millis(1)),
    )
}

fn context() -> RunnerContext {
    RunnerContext {
        execution: Arc::new(PaperEngine::new(dec!(0.001), dec!(10000))),
        risk: Arc::new(Mutex::new(RiskManager::new(RiskLimits::default()))),
        db: None,
        notifier: Arc::new(TelegramNotifier::disabled()),
    }
}

#[tokio::test]
async fn test_client_feeds_engine_snapshots() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = mock_exchange(&mut server).await;
    let feed = client(&server);

    let klines = MarketFeed::klines(feed.as_ref(), "BTCUSDT", "1h", 3).await.unwrap();
    assert_eq!(klines.len(), 3);
    assert!(klines[0].start < klines[2].start);

    let engine = StrategyEngine::new(feed, context(), EngineConfig::default());
    let snapshot = engine.market_snapshot("BTCUSDT").await.unwrap();
    assert_eq!(snapshot.price, dec!(42000.5));
    assert_eq!(snapshot.klines.len(), 3);
    assert_eq!(snapshot.klines.last().map(|k| k.close), Some(dec!(42000.5)));
    assert!(snapshot.ticker.is_some());
}

#[tokio::test]
async fn test_short_history_is_skipped_not_traded() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = mock_exchange(&mut server).await;

    let engine = StrategyEngine::new(client(&server), context(), EngineConfig::default());
    engine
        .register(StrategyConfig::new("ma_btc", "moving_averages"))
        .await
        .unwrap();
    engine.start_strategy("ma_btc").await.unwrap();

    let outcomes = engine.update_all().await;
    assert_eq!(outcomes.len(), 1);
    let (name, outcome) = &outcomes[0];
    assert_eq!(name, "ma_btc");
    assert!(matches!(
        outcome,
        UpdateOutcome::Skipped(AnalysisError::InsufficientData { available: 3, .. })
    ));

    let status = engine.strategies_status().await;
    assert_eq!(status[0].stats.total_trades, 0);
    assert!(status[0].position.is_none());
}

#[tokio::test]
async fn test_run_stops_strategies_on_shutdown() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = mock_exchange(&mut server).await;

    let config = EngineConfig {
        update_interval_secs: 1,
        ..EngineConfig::default()
    };
    let engine = Arc::new(StrategyEngine::new(client(&server), context(), config));
    engine
        .register(StrategyConfig::new("ma_btc", "moving_averages"))
        .await
        .unwrap();
    engine.start_strategy("ma_btc").await.unwrap();
    assert_eq!(engine.status().await.running, 1);

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run(rx).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();

    let status = engine.status().await;
    assert_eq!(status.running, 0);
    assert!(status.uptime_secs.is_none());
}
