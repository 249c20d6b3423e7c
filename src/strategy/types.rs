//! Types shared by every strategy

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use super::registry::StrategyKind;
use crate::bybit::{Kline, Side, Ticker};

/// What a strategy wants the runner to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
    CloseLong,
    CloseShort,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Hold => "HOLD",
            SignalType::CloseLong => "CLOSE_LONG",
            SignalType::CloseShort => "CLOSE_SHORT",
        }
    }

    /// Order side for entry signals
    pub fn entry_side(&self) -> Option<Side> {
        match self {
            SignalType::Buy => Some(Side::Buy),
            SignalType::Sell => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strategy decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub kind: SignalType,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub reason: String,
}

impl Signal {
    pub fn new(kind: SignalType, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Self::new(SignalType::Hold, 0.0, reason)
    }

    pub fn is_hold(&self) -> bool {
        self.kind == SignalType::Hold
    }
}

/// Why a strategy could not evaluate a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("invalid price")]
    InvalidPrice,

    #[error("no kline data")]
    NoKlines,

    #[error("insufficient data: need {required}, have {available}")]
    InsufficientData { required: usize, available: usize },
}

/// Market state handed to a strategy on each update
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: Decimal,
    /// Oldest first
    pub klines: Vec<Kline>,
    pub ticker: Option<Ticker>,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(symbol: impl Into<String>, price: Decimal, klines: Vec<Kline>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            klines,
            ticker: None,
            timestamp: Utc::now(),
        }
    }

    pub fn price_f64(&self) -> f64 {
        self.price.to_f64().unwrap_or(0.0)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.column(|k| k.close)
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.column(|k| k.volume)
    }

    fn column(&self, field: impl Fn(&Kline) -> Decimal) -> Vec<f64> {
        self.klines
            .iter()
            .map(|k| field(k).to_f64().unwrap_or(0.0))
            .collect()
    }

    /// Common entry checks, returning the closes trimmed to `buffer`
    pub fn history(&self, buffer: usize) -> Result<(Vec<f64>, Vec<f64>), AnalysisError> {
        if self.price <= Decimal::ZERO {
            return Err(AnalysisError::InvalidPrice);
        }
        if self.klines.is_empty() {
            return Err(AnalysisError::NoKlines);
        }
        let mut closes = self.closes();
        let mut volumes = self.volumes();
        trim_front(&mut closes, buffer);
        trim_front(&mut volumes, buffer);
        Ok((closes, volumes))
    }
}

fn trim_front(values: &mut Vec<f64>, keep: usize) {
    if values.len() > keep {
        values.drain(..values.len() - keep);
    }
}

/// Fail with `InsufficientData` when fewer than `required` points exist
pub fn require(available: usize, required: usize) -> Result<(), AnalysisError> {
    if available < required {
        Err(AnalysisError::InsufficientData {
            required,
            available,
        })
    } else {
        Ok(())
    }
}

/// A signal generator
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Evaluate the latest snapshot
    fn evaluate(&mut self, snapshot: &MarketSnapshot) -> Result<Signal, AnalysisError>;

    /// An order placed on this strategy's signal was filled
    fn on_fill(&mut self, _side: Side, _price: f64, _qty: f64) {}
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::Duration;

    /// One-minute klines with the given closes and volumes
    pub fn klines(closes: &[f64], volumes: &[f64]) -> Vec<Kline> {
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (c, v))| {
                let close = Decimal::try_from(*c).unwrap();
                Kline {
                    start: start + Duration::minutes(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: Decimal::try_from(*v).unwrap(),
                    turnover: Decimal::ZERO,
                }
            })
            .collect()
    }

    pub fn snapshot(closes: &[f64], volumes: &[f64]) -> MarketSnapshot {
        let last = *closes.last().unwrap();
        MarketSnapshot::new(
            "BTCUSDT",
            Decimal::try_from(last).unwrap(),
            klines(closes, volumes),
        )
    }

    pub fn flat_volumes(n: usize) -> Vec<f64> {
        vec![100.0; n]
    }
}
