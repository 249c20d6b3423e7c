//! Parquet file writer with rotation

use arrow::array::{Array, ArrayRef, BooleanArray, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::bybit::{Kline, Ticker};

fn timestamp_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )
}

/// Decimals are stored as strings to keep full precision
fn decimal_field(name: &str) -> Field {
    Field::new(name, DataType::Utf8, false)
}

pub fn ticker_schema() -> Schema {
    Schema::new(vec![
        timestamp_field("timestamp"),
        Field::new("symbol", DataType::Utf8, false),
        decimal_field("last_price"),
        decimal_field("bid_price"),
        decimal_field("bid_size"),
        decimal_field("ask_price"),
        decimal_field("ask_size"),
        decimal_field("price_24h_pcnt"),
        decimal_field("high_24h"),
        decimal_field("low_24h"),
        decimal_field("volume_24h"),
        decimal_field("turnover_24h"),
    ])
}

pub fn kline_schema() -> Schema {
    Schema::new(vec![
        timestamp_field("timestamp"),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("interval", DataType::Utf8, false),
        timestamp_field("start"),
        decimal_field("open"),
        decimal_field("high"),
        decimal_field("low"),
        decimal_field("close"),
        decimal_field("volume"),
        decimal_field("turnover"),
        Field::new("confirmed", DataType::Boolean, false),
    ])
}

/// A ticker as captured
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub last_price: Decimal,
    pub bid_price: Decimal,
    pub bid_size: Decimal,
    pub ask_price: Decimal,
    pub ask_size: Decimal,
    pub price_24h_pcnt: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub volume_24h: Decimal,
    pub turnover_24h: Decimal,
}

impl TickerRecord {
    pub fn from_ticker(ticker: &Ticker, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            symbol: ticker.symbol.clone(),
            last_price: ticker.last_price,
            bid_price: ticker.bid_price,
            bid_size: ticker.bid_size,
            ask_price: ticker.ask_price,
            ask_size: ticker.ask_size,
            price_24h_pcnt: ticker.price_24h_pcnt,
            high_24h: ticker.high_price_24h,
            low_24h: ticker.low_price_24h,
            volume_24h: ticker.volume_24h,
            turnover_24h: ticker.turnover_24h,
        }
    }
}

/// A kline update as captured
#[derive(Debug, Clone, PartialEq)]
pub struct KlineRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub interval: String,
    pub start: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub turnover: Decimal,
    pub confirmed: bool,
}

impl KlineRecord {
    pub fn from_kline(
        symbol: &str,
        interval: &str,
        kline: &Kline,
        confirmed: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            start: kline.start,
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.volume,
            turnover: kline.turnover,
            confirmed,
        }
    }
}

fn micros<T>(rows: &[T], f: impl Fn(&T) -> DateTime<Utc>) -> ArrayRef {
    let values: Vec<i64> = rows.iter().map(|r| f(r).timestamp_micros()).collect();
    Arc::new(TimestampMicrosecondArray::from(values).with_timezone("UTC"))
}

fn strings<T>(rows: &[T], f: impl Fn(&T) -> String) -> ArrayRef {
    let values: Vec<String> = rows.iter().map(f).collect();
    Arc::new(StringArray::from(values))
}

/// Parquet file writer with time-based rotation
pub struct ParquetWriter {
    output_dir: PathBuf,
    rotation_interval: Duration,
    current_file_start: Option<DateTime<Utc>>,
}

impl ParquetWriter {
    pub fn new(output_dir: PathBuf, rotation_interval_secs: u64) -> Self {
        Self {
            output_dir,
            rotation_interval: Duration::seconds(rotation_interval_secs as i64),
            current_file_start: None,
        }
    }

    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        match self.current_file_start {
            None => true,
            Some(start) => now - start >= self.rotation_interval,
        }
    }

    pub fn mark_rotation(&mut self, timestamp: DateTime<Utc>) {
        self.current_file_start = Some(timestamp);
    }

    /// Start of the current rotation window
    pub fn current_file_start(&self) -> Option<DateTime<Utc>> {
        self.current_file_start
    }

    pub fn file_path(&self, prefix: &str, timestamp: DateTime<Utc>) -> PathBuf {
        let filename = format!("{}_{}.parquet", prefix, timestamp.format("%Y%m%d_%H%M%S"));
        self.output_dir.join(filename)
    }

    fn write_batch(&self, path: &Path, schema: SchemaRef, columns: Vec<ArrayRef>) -> anyhow::Result<()> {
        self.ensure_dir()?;
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        writer.write(&RecordBatch::try_new(schema, columns)?)?;
        writer.close()?;
        Ok(())
    }

    pub fn write_tickers(&self, path: &Path, rows: &[TickerRecord]) -> anyhow::Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let columns = vec![
            micros(rows, |r| r.timestamp),
            strings(rows, |r| r.symbol.clone()),
            strings(rows, |r| r.last_price.to_string()),
            strings(rows, |r| r.bid_price.to_string()),
            strings(rows, |r| r.bid_size.to_string()),
            strings(rows, |r| r.ask_price.to_string()),
            strings(rows, |r| r.ask_size.to_string()),
            strings(rows, |r| r.price_24h_pcnt.to_string()),
            strings(rows, |r| r.high_24h.to_string()),
            strings(rows, |r| r.low_24h.to_string()),
            strings(rows, |r| r.volume_24h.to_string()),
            strings(rows, |r| r.turnover_24h.to_string()),
        ];
        self.write_batch(path, Arc::new(ticker_schema()), columns)?;
        tracing::debug!(path = ?path, count = rows.len(), "Wrote tickers to Parquet");
        Ok(())
    }

    pub fn write_klines(&self, path: &Path, rows: &[KlineRecord]) -> anyhow::Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let confirmed: Vec<bool> = rows.iter().map(|r| r.confirmed).collect();
        let columns = vec![
            micros(rows, |r| r.timestamp),
            strings(rows, |r| r.symbol.clone()),
            strings(rows, |r| r.interval.clone()),
            micros(rows, |r| r.start),
            strings(rows, |r| r.open.to_string()),
            strings(rows, |r| r.high.to_string()),
            strings(rows, |r| r.low.to_string()),
            strings(rows, |r| r.close.to_string()),
            strings(rows, |r| r.volume.to_string()),
            strings(rows, |r| r.turnover.to_string()),
            Arc::new(BooleanArray::from(confirmed)) as ArrayRef,
        ];
        self.write_batch(path, Arc::new(kline_schema()), columns)?;
        tracing::debug!(path = ?path, count = rows.len(), "Wrote klines to Parquet");
        Ok(())
    }
}

/// Reads captured files back
pub struct ParquetReader {
    path: PathBuf,
}

struct Columns<'a> {
    batch: &'a RecordBatch,
}

impl<'a> Columns<'a> {
    fn get<A: Array + 'static>(&self, name: &str) -> anyhow::Result<&'a A> {
        self.batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<A>())
            .ok_or_else(|| anyhow::anyhow!("missing or invalid column '{}'", name))
    }

    fn decimal(&self, name: &str, row: usize) -> anyhow::Result<Decimal> {
        Ok(Decimal::from_str(self.get::<StringArray>(name)?.value(row))?)
    }

    fn time(&self, name: &str, row: usize) -> anyhow::Result<DateTime<Utc>> {
        let micros = self.get::<TimestampMicrosecondArray>(name)?.value(row);
        DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| anyhow::anyhow!("invalid timestamp in '{}'", name))
    }

    fn string(&self, name: &str, row: usize) -> anyhow::Result<String> {
        Ok(self.get::<StringArray>(name)?.value(row).to_string())
    }
}

impl ParquetReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn batches(&self) -> anyhow::Result<Vec<RecordBatch>> {
        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        Ok(reader.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn read_tickers(&self) -> anyhow::Result<Vec<TickerRecord>> {
        let mut rows = Vec::new();
        for batch in self.batches()? {
            let c = Columns { batch: &batch };
            for i in 0..batch.num_rows() {
                rows.push(TickerRecord {
                    timestamp: c.time("timestamp", i)?,
                    symbol: c.string("symbol", i)?,
                    last_price: c.decimal("last_price", i)?,
                    bid_price: c.decimal("bid_price", i)?,
                    bid_size: c.decimal("bid_size", i)?,
                    ask_price: c.decimal("ask_price", i)?,
                    ask_size: c.decimal("ask_size", i)?,
                    price_24h_pcnt: c.decimal("price_24h_pcnt", i)?,
                    high_24h: c.decimal("high_24h", i)?,
                    low_24h: c.decimal("low_24h", i)?,
                    volume_24h: c.decimal("volume_24h", i)?,
                    turnover_24h: c.decimal("turnover_24h", i)?,
                });
            }
        }
        Ok(rows)
    }

    pub fn read_klines(&self) -> anyhow::Result<Vec<KlineRecord>> {
        let mut rows = Vec::new();
        for batch in self.batches()? {
            let c = Columns { batch: &batch };
            let confirmed = c.get::<BooleanArray>("confirmed")?;
            for i in 0..batch.num_rows() {
                rows.push(KlineRecord {
                    timestamp: c.time("timestamp", i)?,
                    symbol: c.string("symbol", i)?,
                    interval: c.string("interval", i)?,
                    start: c.time("start", i)?,
                    open: c.decimal("open", i)?,
                    high: c.decimal("high", i)?,
                    low: c.decimal("low", i)?,
                    close: c.decimal("close", i)?,
                    volume: c.decimal("volume", i)?,
                    turnover: c.decimal("turnover", i)?,
                    confirmed: confirmed.value(i),
                });
            }
        }
        Ok(rows)
    }
}
