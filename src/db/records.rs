//! Journal row types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::bybit::{OrderType, Side};

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// What a strategy did, as written to `strategy_logs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyAction {
    StrategyStarted,
    StrategyStopped,
    StrategyPaused,
    StrategyResumed,
    SignalGenerated,
    RiskRejected,
    PositionOpened,
    PositionClosed,
    PartialClose,
    StopsUpdated,
    Error,
}

impl StrategyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyAction::StrategyStarted => "STRATEGY_STARTED",
            StrategyAction::StrategyStopped => "STRATEGY_STOPPED",
            StrategyAction::StrategyPaused => "STRATEGY_PAUSED",
            StrategyAction::StrategyResumed => "STRATEGY_RESUMED",
            StrategyAction::SignalGenerated => "SIGNAL_GENERATED",
            StrategyAction::RiskRejected => "RISK_REJECTED",
            StrategyAction::PositionOpened => "POSITION_OPENED",
            StrategyAction::PositionClosed => "POSITION_CLOSED",
            StrategyAction::PartialClose => "PARTIAL_CLOSE",
            StrategyAction::StopsUpdated => "STOPS_UPDATED",
            StrategyAction::Error => "ERROR",
        }
    }
}

impl fmt::Display for StrategyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application log line
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub level: String,
    pub logger_name: String,
    pub module: Option<String>,
    pub message: String,
    pub exception: Option<String>,
}

impl NewLogEntry {
    pub fn new(level: &str, logger_name: &str, message: impl Into<String>) -> Self {
        Self {
            level: level.to_uppercase(),
            logger_name: logger_name.to_string(),
            module: None,
            message: message.into(),
            exception: None,
        }
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }
}

/// A trade to journal
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub executed_price: Option<Decimal>,
    pub executed_quantity: Option<Decimal>,
    pub status: String,
    pub strategy_name: Option<String>,
    pub profit_loss: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub additional_data: Option<serde_json::Value>,
}

impl NewTrade {
    /// A market order with a known fill
    pub fn market(
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: Some(price),
            executed_price: Some(price),
            executed_quantity: Some(quantity),
            status: "Filled".to_string(),
            strategy_name: None,
            profit_loss: None,
            commission: None,
            additional_data: None,
        }
    }

    pub fn for_strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy_name = Some(name.into());
        self
    }

    pub fn with_pnl(mut self, pnl: Decimal) -> Self {
        self.profit_loss = Some(pnl);
        self
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TradeRow {
    pub timestamp: i64,
    pub order_id: Option<String>,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub quantity: f64,
    pub price: Option<f64>,
    pub executed_price: Option<f64>,
    pub status: String,
    pub strategy_name: Option<String>,
    pub profit_loss: Option<f64>,
    pub environment: String,
}

/// A journaled trade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub order_id: Option<String>,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub quantity: f64,
    pub price: Option<f64>,
    pub executed_price: Option<f64>,
    pub status: String,
    pub strategy_name: Option<String>,
    pub profit_loss: Option<f64>,
    pub environment: String,
}

impl From<TradeRow> for TradeRecord {
    fn from(row: TradeRow) -> Self {
        Self {
            timestamp: from_millis(row.timestamp),
            order_id: row.order_id,
            symbol: row.symbol,
            side: row.side,
            order_type: row.order_type,
            quantity: row.quantity,
            price: row.price,
            executed_price: row.executed_price,
            status: row.status,
            strategy_name: row.strategy_name,
            profit_loss: row.profit_loss,
            environment: row.environment,
        }
    }
}

/// A strategy event to journal
#[derive(Debug, Clone)]
pub struct NewStrategyLog {
    pub strategy_name: String,
    pub symbol: Option<String>,
    pub action: StrategyAction,
    /// Technical detail for analysis
    pub details: Option<String>,
    /// Plain-language description
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl NewStrategyLog {
    pub fn new(strategy_name: impl Into<String>, action: StrategyAction) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            symbol: None,
            action,
            details: None,
            message: None,
            data: None,
        }
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StrategyLogRow {
    pub timestamp: i64,
    pub strategy_name: String,
    pub symbol: Option<String>,
    pub action: String,
    pub details: Option<String>,
    pub message: Option<String>,
    pub data: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyLogRecord {
    pub timestamp: DateTime<Utc>,
    pub strategy_name: String,
    pub symbol: Option<String>,
    pub action: String,
    pub details: Option<String>,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
    pub session_id: Option<String>,
}

impl From<StrategyLogRow> for StrategyLogRecord {
    fn from(row: StrategyLogRow) -> Self {
        Self {
            timestamp: from_millis(row.timestamp),
            strategy_name: row.strategy_name,
            symbol: row.symbol,
            action: row.action,
            details: row.details,
            message: row.message,
            data: row.data.and_then(|d| serde_json::from_str(&d).ok()),
            session_id: row.session_id,
        }
    }
}

/// Periodic performance snapshot for one strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub strategy_name: Option<String>,
    pub symbol: Option<String>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub total_profit_loss: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub avg_profit: Option<f64>,
    pub avg_loss: Option<f64>,
    pub sharpe_ratio: Option<f64>,
}

/// Aggregate over journaled trades
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Percent, two decimals
    pub win_rate: f64,
    /// Four decimals
    pub total_pnl: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TickerRow {
    pub symbol: String,
    pub price: f64,
    pub change_24h: f64,
    pub volume_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub risk_level: String,
    pub last_updated: i64,
}

/// A ticker from the local cache
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedTicker {
    pub symbol: String,
    pub price: f64,
    /// Percent
    pub change_24h: f64,
    pub volume_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub risk_level: String,
    pub last_updated: DateTime<Utc>,
}

impl From<TickerRow> for CachedTicker {
    fn from(row: TickerRow) -> Self {
        Self {
            symbol: row.symbol,
            price: row.price,
            change_24h: row.change_24h,
            volume_24h: row.volume_24h,
            high_24h: row.high_24h,
            low_24h: row.low_24h,
            risk_level: row.risk_level,
            last_updated: from_millis(row.last_updated),
        }
    }
}

/// Rows removed by a cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub log_entries: u64,
    pub strategy_logs: u64,
    pub api_requests: u64,
    pub risk_events: u64,
    pub market_data: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.log_entries + self.strategy_logs + self.api_requests + self.risk_events + self.market_data
    }
}
