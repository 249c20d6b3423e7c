//! Runner, risk manager, paper execution and journal working together

use std::sync::Arc;

use bybit_bot::config::StrategyConfig;
use bybit_bot::db::Database;
use bybit_bot::execution::PaperEngine;
use bybit_bot::notify::TelegramNotifier;
use bybit_bot::risk::{ExitReason, RiskLimits, RiskManager};
use bybit_bot::strategy::{RunnerContext, RunnerState, Signal, SignalType, StrategyRunner, UpdateOutcome};
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

async fn context(limits: RiskLimits) -> RunnerContext {
    RunnerContext {
        execution: Arc::new(PaperEngine::new(dec!(0), dec!(100000))),
        risk: Arc::new(Mutex::new(RiskManager::new(limits))),
        db: Some(Database::in_memory("testnet").await.unwrap()),
        notifier: Arc::new(TelegramNotifier::disabled()),
    }
}

fn settings() -> StrategyConfig {
    let mut config = StrategyConfig::new("ma_btc", "moving_averages");
    config.position_size = dec!(0.01);
    config
}

#[tokio::test]
async fn test_round_trip_is_journaled() {
    let ctx = context(RiskLimits::default()).await;
    let db = ctx.db.clone().unwrap();
    let mut runner = StrategyRunner::new(settings(), ctx).unwrap();
    runner.start().await.unwrap();

    let opened = runner
        .execute_external_signal(Signal::new(SignalType::Buy, 0.9, "manual"), dec!(100))
        .await
        .unwrap();
    assert!(matches!(opened, UpdateOutcome::Opened { .. }));
    assert!(runner.position().is_some());

    let closed = runner
        .execute_external_signal(Signal::new(SignalType::CloseLong, 0.9, "manual"), dec!(110))
        .await
        .unwrap();
    match closed {
        UpdateOutcome::Closed { reason, pnl } => {
            assert_eq!(reason, ExitReason::Signal);
            assert_eq!(pnl, dec!(0.1));
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(runner.stats().winning_trades, 1);

    let trades = db.trade_history(1, Some("BTCUSDT"), Some("ma_btc")).await.unwrap();
    assert_eq!(trades.len(), 2);
    let summary = db.performance_summary(Some("ma_btc"), 1).await.unwrap();
    assert_eq!(summary.winning_trades, 1);

    let actions: Vec<_> = db
        .strategy_logs(Some("ma_btc"), 20)
        .await
        .unwrap()
        .into_iter()
        .map(|log| log.action)
        .collect();
    assert!(actions.iter().any(|a| a == "STRATEGY_STARTED"));
    assert!(actions.iter().any(|a| a == "POSITION_OPENED"));
    assert!(actions.iter().any(|a| a == "POSITION_CLOSED"));
}

#[tokio::test]
async fn test_low_confidence_signal_pauses_runner() {
    let ctx = context(RiskLimits::default()).await;
    let mut runner = StrategyRunner::new(settings(), ctx).unwrap();
    runner.start().await.unwrap();

    let outcome = runner
        .execute_external_signal(Signal::new(SignalType::Buy, 0.2, "weak"), dec!(100))
        .await
        .unwrap();
    assert!(matches!(outcome, UpdateOutcome::RiskRejected(_)));
    assert_eq!(runner.state(), RunnerState::Paused);
    assert!(runner.position().is_none());

    runner.resume().await.unwrap();
    assert!(runner.is_running());
}

#[tokio::test]
async fn test_stop_closes_open_position() {
    let ctx = context(RiskLimits::default()).await;
    let mut runner = StrategyRunner::new(settings(), ctx).unwrap();
    runner.start().await.unwrap();
    runner
        .execute_external_signal(Signal::new(SignalType::Sell, 0.9, "manual"), dec!(100))
        .await
        .unwrap();

    runner.stop().await.unwrap();
    assert_eq!(runner.state(), RunnerState::Stopped);
    assert!(runner.position().is_none());
    assert_eq!(runner.stats().total_trades, 1);
}
