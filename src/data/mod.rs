//! Market-data capture
//!
//! Streams public tickers and klines into rotating Parquet files for
//! offline analysis.

mod capture;
mod parquet;
mod recorder;

pub use capture::{capture, capture_events, capture_topics, record_event};
pub use parquet::{
    kline_schema, ticker_schema, KlineRecord, ParquetReader, ParquetWriter, TickerRecord,
};
pub use recorder::{DataRecorder, RecorderConfig, RecorderStats};
