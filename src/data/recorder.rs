//! Buffered background recording of market data

use super::parquet::{KlineRecord, ParquetWriter, TickerRecord};
use crate::config::DataConfig;
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    pub rotation_interval_secs: u64,
    /// Rows buffered before a flush
    pub buffer_size: usize,
    /// Maximum time between flushes
    pub flush_interval_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            rotation_interval_secs: 3600,
            buffer_size: 1000,
            flush_interval_secs: 60,
        }
    }
}

impl From<&DataConfig> for RecorderConfig {
    fn from(config: &DataConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            rotation_interval_secs: config.rotation_secs(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecorderStats {
    pub tickers_received: u64,
    pub tickers_written: u64,
    pub klines_received: u64,
    pub klines_written: u64,
    pub files_written: u64,
    pub write_errors: u64,
    pub last_flush: Option<chrono::DateTime<Utc>>,
}

/// A row type with its own output file series
trait Recorded: Sized + Send + 'static {
    const PREFIX: &'static str;

    fn write(writer: &ParquetWriter, path: &Path, rows: &[Self]) -> anyhow::Result<()>;

    fn count(stats: &mut RecorderStats, received: u64, written: u64);
}

impl Recorded for TickerRecord {
    const PREFIX: &'static str = "tickers";

    fn write(writer: &ParquetWriter, path: &Path, rows: &[Self]) -> anyhow::Result<()> {
        writer.write_tickers(path, rows)
    }

    fn count(stats: &mut RecorderStats, received: u64, written: u64) {
        stats.tickers_received += received;
        stats.tickers_written += written;
    }
}

impl Recorded for KlineRecord {
    const PREFIX: &'static str = "klines";

    fn write(writer: &ParquetWriter, path: &Path, rows: &[Self]) -> anyhow::Result<()> {
        writer.write_klines(path, rows)
    }

    fn count(stats: &mut RecorderStats, received: u64, written: u64) {
        stats.klines_received += received;
        stats.klines_written += written;
    }
}

/// Records tickers and klines to Parquet, one writer task per stream
pub struct DataRecorder {
    config: RecorderConfig,
    ticker_tx: mpsc::Sender<TickerRecord>,
    kline_tx: mpsc::Sender<KlineRecord>,
    stats: Arc<RwLock<RecorderStats>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DataRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        let (ticker_tx, ticker_rx) = mpsc::channel(10_000);
        let (kline_tx, kline_rx) = mpsc::channel(10_000);
        let stats = Arc::new(RwLock::new(RecorderStats::default()));

        let tasks = vec![
            tokio::spawn(run_writer(ticker_rx, config.clone(), stats.clone())),
            tokio::spawn(run_writer(kline_rx, config.clone(), stats.clone())),
        ];

        Self {
            config,
            ticker_tx,
            kline_tx,
            stats,
            tasks,
        }
    }

    pub fn with_output_dir(output_dir: PathBuf) -> Self {
        Self::new(RecorderConfig {
            output_dir,
            ..Default::default()
        })
    }

    pub async fn record_ticker(&self, record: TickerRecord) -> anyhow::Result<()> {
        self.ticker_tx
            .send(record)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to queue ticker: {}", e))
    }

    pub async fn record_kline(&self, record: KlineRecord) -> anyhow::Result<()> {
        self.kline_tx
            .send(record)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to queue kline: {}", e))
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub async fn stats(&self) -> RecorderStats {
        self.stats.read().await.clone()
    }

    /// Close the channels and wait for the writers to flush what they hold
    pub async fn shutdown(self) -> RecorderStats {
        let DataRecorder {
            ticker_tx,
            kline_tx,
            stats,
            tasks,
            ..
        } = self;
        drop(ticker_tx);
        drop(kline_tx);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Recorder task failed");
            }
        }
        let final_stats = stats.read().await.clone();
        final_stats
    }
}

async fn run_writer<R: Recorded>(
    mut rx: mpsc::Receiver<R>,
    config: RecorderConfig,
    stats: Arc<RwLock<RecorderStats>>,
) {
    let mut writer = ParquetWriter::new(config.output_dir.clone(), config.rotation_interval_secs);
    let mut buffer: Vec<R> = Vec::with_capacity(config.buffer_size);
    let flush_every = Duration::seconds(config.flush_interval_secs as i64);
    let mut last_flush = Utc::now();
    let mut ticker =
        tokio::time::interval(tokio::time::Duration::from_secs(config.flush_interval_secs.max(1)));

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(row) => {
                    R::count(&mut *stats.write().await, 1, 0);
                    buffer.push(row);
                    if buffer.len() >= config.buffer_size {
                        flush(&mut buffer, &mut writer, &stats).await;
                        last_flush = Utc::now();
                    }
                }
                None => {
                    flush(&mut buffer, &mut writer, &stats).await;
                    tracing::info!(stream = R::PREFIX, "Writer shutting down");
                    break;
                }
            },
            _ = ticker.tick() => {
                let now = Utc::now();
                if now - last_flush >= flush_every {
                    flush(&mut buffer, &mut writer, &stats).await;
                    last_flush = now;
                }
            }
        }
    }
}

/// Append the buffer to a new file inside the current rotation window
async fn flush<R: Recorded>(
    buffer: &mut Vec<R>,
    writer: &mut ParquetWriter,
    stats: &Arc<RwLock<RecorderStats>>,
) {
    if buffer.is_empty() {
        return;
    }

    let now = Utc::now();
    if writer.needs_rotation(now) {
        writer.mark_rotation(now);
    }
    let path = writer.file_path(R::PREFIX, now);
    let count = buffer.len();

    match R::write(writer, &path, buffer) {
        Ok(()) => {
            let mut s = stats.write().await;
            R::count(&mut s, 0, count as u64);
            s.files_written += 1;
            s.last_flush = Some(now);
            tracing::debug!(count, path = ?path, "Flushed {}", R::PREFIX);
        }
        Err(e) => {
            stats.write().await.write_errors += 1;
            tracing::error!(error = %e, stream = R::PREFIX, "Failed to write capture file");
        }
    }
    buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bybit::Kline;
    use crate::data::ParquetReader;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn config(dir: &TempDir, buffer_size: usize) -> RecorderConfig {
        RecorderConfig {
            output_dir: dir.path().to_path_buf(),
            rotation_interval_secs: 3600,
            buffer_size,
            flush_interval_secs: 60,
        }
    }

    fn ticker() -> TickerRecord {
        TickerRecord {
            timestamp: Utc::now(),
            symbol: "BTCUSDT".into(),
            last_price: dec!(42500),
            bid_price: dec!(42499.5),
            bid_size: dec!(1),
            ask_price: dec!(42500.5),
            ask_size: dec!(1),
            price_24h_pcnt: dec!(0.01),
            high_24h: dec!(43000),
            low_24h: dec!(42000),
            volume_24h: dec!(100),
            turnover_24h: dec!(4250000),
        }
    }

    #[tokio::test]
    async fn test_full_buffer_flushes() {
        let dir = TempDir::new().unwrap();
        let recorder = DataRecorder::new(config(&dir, 2));
        recorder.record_ticker(ticker()).await.unwrap();
        recorder.record_ticker(ticker()).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
        let stats = recorder.stats().await;
        assert_eq!(stats.tickers_received, 2);
        assert_eq!(stats.tickers_written, 2);
        assert_eq!(stats.files_written, 1);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_partial_buffers() {
        let dir = TempDir::new().unwrap();
        let recorder = DataRecorder::new(config(&dir, 100));
        recorder.record_ticker(ticker()).await.unwrap();
        let kline = Kline {
            start: Utc::now(),
            open: dec!(1),
            high: dec!(2),
            low: dec!(1),
            close: dec!(2),
            volume: dec!(10),
            turnover: dec!(15),
        };
        recorder
            .record_kline(KlineRecord::from_kline("BTCUSDT", "1", &kline, false, Utc::now()))
            .await
            .unwrap();

        let stats = recorder.shutdown().await;
        assert_eq!(stats.tickers_written, 1);
        assert_eq!(stats.klines_written, 1);
        assert_eq!(stats.files_written, 2);

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        let klines_file = files
            .iter()
            .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("klines_"))
            .unwrap();
        let rows = ParquetReader::new(klines_file.clone()).read_klines().unwrap();
        assert_eq!(rows[0].close, dec!(2));
    }

    #[test]
    fn test_config_from_data_section() {
        let data = DataConfig {
            rotation_interval: "30m".into(),
            ..DataConfig::default()
        };
        let config = RecorderConfig::from(&data);
        assert_eq!(config.rotation_interval_secs, 1800);
        assert_eq!(config.buffer_size, 1000);
    }
}
