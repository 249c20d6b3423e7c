//! File-backed trade journal: persistence across reopen, backup and cleanup

use bybit_bot::bybit::Side;
use bybit_bot::db::{Database, NewTrade};
use rust_decimal_macros::dec;
use tempfile::TempDir;

#[test]
fn test_journal_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trading_bot_testnet.db");

    tokio_test::block_on(async {
        let db = Database::open(&path, "testnet").await.unwrap();
        db.record_trade(
            &NewTrade::market("o-1", "BTCUSDT", Side::Buy, dec!(0.01), dec!(42000)).for_strategy("ma_btc"),
        )
        .await
        .unwrap();
        db.record_trade(
            &NewTrade::market("o-2", "BTCUSDT", Side::Sell, dec!(0.01), dec!(42500))
                .for_strategy("ma_btc")
                .with_pnl(dec!(5)),
        )
        .await
        .unwrap();
        db.close().await;

        let db = Database::open(&path, "testnet").await.unwrap();
        let trades = db.trade_history(1, None, Some("ma_btc")).await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].order_id.as_deref(), Some("o-2"));
        assert_eq!(trades[0].profit_loss, Some(5.0));
        assert_eq!(trades[0].environment, "testnet");

        let summary = db.performance_summary(None, 30).await.unwrap();
        assert_eq!(summary.total_trades, 2);
        assert_eq!(summary.winning_trades, 1);
        assert_eq!(summary.total_pnl, 5.0);
        db.close().await;
    });
}

#[tokio::test]
async fn test_backup_and_cleanup() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("bot.db"), "testnet").await.unwrap();
    db.record_trade(&NewTrade::market("o-1", "ETHUSDT", Side::Buy, dec!(1), dec!(2200)))
        .await
        .unwrap();

    let backup = db.backup(&dir.path().join("backups")).await.unwrap();
    assert!(backup.exists());
    assert!(backup
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("trading_bot_backup_")));

    let copy = Database::open(&backup, "testnet").await.unwrap();
    assert_eq!(copy.trade_history(1, Some("ETHUSDT"), None).await.unwrap().len(), 1);
    copy.close().await;

    // Fresh rows are inside any retention window
    let report = db.cleanup_old_data(1).await.unwrap();
    assert_eq!(report.total(), 0);
    assert_eq!(db.trade_history(1, None, None).await.unwrap().len(), 1);
    db.close().await;
}
