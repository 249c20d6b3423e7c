//! Public market-data capture from the Bybit stream

use chrono::Utc;
use tokio::sync::mpsc;

use super::parquet::{KlineRecord, TickerRecord};
use super::recorder::{DataRecorder, RecorderStats};
use crate::bybit::{interval_for, topics, BybitStream, StreamEvent};

/// Topics for tickers and `timeframe` klines of each symbol
pub fn capture_topics(symbols: &[String], timeframe: &str) -> anyhow::Result<Vec<String>> {
    let interval = interval_for(timeframe)
        .ok_or_else(|| anyhow::anyhow!("unsupported kline timeframe '{}'", timeframe))?;
    Ok(symbols
        .iter()
        .flat_map(|s| [topics::tickers(s), topics::kline(interval, s)])
        .collect())
}

/// Hand one stream event to the recorder. Returns false once the stream is gone.
pub async fn record_event(recorder: &DataRecorder, event: StreamEvent) -> anyhow::Result<bool> {
    let now = Utc::now();
    match event {
        StreamEvent::Ticker(ticker) => {
            recorder
                .record_ticker(TickerRecord::from_ticker(&ticker, now))
                .await?;
        }
        StreamEvent::Kline {
            symbol,
            interval,
            kline,
            confirmed,
        } => {
            recorder
                .record_kline(KlineRecord::from_kline(&symbol, &interval, &kline, confirmed, now))
                .await?;
        }
        StreamEvent::Disconnected => return Ok(false),
        _ => {}
    }
    Ok(true)
}

/// Drain `events` into the recorder until the stream ends or Ctrl-C
pub async fn capture_events(
    recorder: DataRecorder,
    mut events: mpsc::Receiver<StreamEvent>,
) -> anyhow::Result<RecorderStats> {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if !record_event(&recorder, event).await? {
                    tracing::warn!("Stream closed, stopping capture");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, stopping capture");
                break;
            }
        }
    }

    let stats = recorder.shutdown().await;
    tracing::info!(
        tickers = stats.tickers_written,
        klines = stats.klines_written,
        files = stats.files_written,
        "Capture finished"
    );
    Ok(stats)
}

/// Subscribe to the public stream for `symbols` and record until Ctrl-C
pub async fn capture(
    recorder: DataRecorder,
    testnet: bool,
    symbols: &[String],
    timeframe: &str,
) -> anyhow::Result<RecorderStats> {
    let stream = capture_topics(symbols, timeframe)?
        .into_iter()
        .fold(BybitStream::public(testnet), |stream, topic| stream.subscribe(topic));
    tracing::info!(
        output = ?recorder.output_dir(),
        symbols = ?symbols,
        timeframe,
        "Starting market-data capture"
    );
    capture_events(recorder, stream.connect()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bybit::Kline;
    use crate::data::RecorderConfig;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    #[test]
    fn test_capture_topics() {
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let topics = capture_topics(&symbols, "1m").unwrap();
        assert_eq!(
            topics,
            vec!["tickers.BTCUSDT", "kline.1.BTCUSDT", "tickers.ETHUSDT", "kline.1.ETHUSDT"]
        );
        assert!(capture_topics(&symbols, "7m").is_err());
    }

    #[tokio::test]
    async fn test_capture_events_until_disconnect() {
        let dir = TempDir::new().unwrap();
        let recorder = DataRecorder::new(RecorderConfig {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(8);

        let ticker = serde_json::from_value(serde_json::json!({
            "symbol": "BTCUSDT",
            "lastPrice": "42000.1",
            "bid1Price": "42000",
            "ask1Price": "42000.2"
        }))
        .unwrap();
        tx.send(StreamEvent::Connected).await.unwrap();
        tx.send(StreamEvent::Ticker(ticker)).await.unwrap();
        tx.send(StreamEvent::Kline {
            symbol: "BTCUSDT".into(),
            interval: "1".into(),
            kline: Kline {
                start: Utc::now(),
                open: dec!(1),
                high: dec!(1),
                low: dec!(1),
                close: dec!(1),
                volume: dec!(1),
                turnover: dec!(1),
            },
            confirmed: true,
        })
        .await
        .unwrap();
        tx.send(StreamEvent::Disconnected).await.unwrap();

        let stats = capture_events(recorder, rx).await.unwrap();
        assert_eq!(stats.tickers_written, 1);
        assert_eq!(stats.klines_written, 1);
    }
}
