//! Stream events recorded to Parquet and read back

use bybit_bot::bybit::{Kline, StreamEvent, Ticker};
use bybit_bot::data::{capture_events, DataRecorder, ParquetReader, RecorderConfig};
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".parquet"))
        })
        .collect();
    files.sort();
    files
}

fn ticker(price: &str) -> Ticker {
    serde_json::from_value(serde_json::json!({
        "symbol": "ETHUSDT",
        "lastPrice": price,
        "bid1Price": "2199.9",
        "ask1Price": "2200.1",
        "price24hPcnt": "-0.012"
    }))
    .unwrap()
}

#[tokio::test]
async fn test_captured_stream_reads_back() {
    let dir = TempDir::new().unwrap();
    let recorder = DataRecorder::new(RecorderConfig {
        output_dir: dir.path().to_path_buf(),
        ..Default::default()
    });
    let (tx, rx) = mpsc::channel(16);

    tx.send(StreamEvent::Ticker(ticker("2200"))).await.unwrap();
    tx.send(StreamEvent::Ticker(ticker("2201.5"))).await.unwrap();
    tx.send(StreamEvent::Kline {
        symbol: "ETHUSDT".into(),
        interval: "1".into(),
        kline: Kline {
            start: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            open: dec!(2199),
            high: dec!(2202),
            low: dec!(2198),
            close: dec!(2201.5),
            volume: dec!(12.5),
            turnover: dec!(27518.75),
        },
        confirmed: false,
    })
    .await
    .unwrap();
    drop(tx);

    let stats = capture_events(recorder, rx).await.unwrap();
    assert_eq!(stats.tickers_received, 2);
    assert_eq!(stats.tickers_written, 2);
    assert_eq!(stats.klines_written, 1);
    assert_eq!(stats.write_errors, 0);

    let ticker_files = files_with_prefix(dir.path(), "tickers");
    assert_eq!(ticker_files.len(), 1);
    let tickers = ParquetReader::new(ticker_files[0].clone()).read_tickers().unwrap();
    assert_eq!(tickers.len(), 2);
    assert_eq!(tickers[1].last_price, dec!(2201.5));
    assert_eq!(tickers[0].price_24h_pcnt, dec!(-0.012));

    let kline_files = files_with_prefix(dir.path(), "klines");
    let klines = ParquetReader::new(kline_files[0].clone()).read_klines().unwrap();
    assert_eq!(klines.len(), 1);
    assert_eq!(klines[0].close, dec!(2201.5));
    assert!(!klines[0].confirmed);
    assert_eq!(klines[0].start.timestamp(), 1_700_000_000);
}
