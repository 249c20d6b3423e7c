//! Risk management types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a trade was refused
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskViolation {
    /// Trading is blocked until the given instant
    #[error("trading blocked until {until}: {reason}")]
    Blocked {
        reason: String,
        until: DateTime<Utc>,
    },
    #[error("daily loss limit exceeded: {current:.2}% >= {limit}%")]
    DailyLoss { current: f64, limit: f64 },
    #[error("consecutive loss limit exceeded: {current} >= {limit}")]
    ConsecutiveLosses { current: u32, limit: u32 },
    #[error("stop loss {current}% exceeds maximum {limit}%")]
    StopLossTooWide { current: f64, limit: f64 },
    #[error("position size {current}% exceeds maximum {limit}%")]
    PositionTooLarge { current: f64, limit: f64 },
    #[error("signal confidence {current:.2} below {limit}")]
    LowConfidence { current: f64, limit: f64 },
    #[error("daily trade limit reached: {current}/{limit}")]
    TooManyTrades { current: u32, limit: u32 },
    #[error("maximum drawdown exceeded: {current:.2}% >= {limit}%")]
    Drawdown { current: f64, limit: f64 },
}

impl RiskViolation {
    /// Whether this violation blocks all trading for a period
    pub fn blocks_trading(&self) -> bool {
        matches!(
            self,
            RiskViolation::Blocked { .. }
                | RiskViolation::DailyLoss { .. }
                | RiskViolation::ConsecutiveLosses { .. }
                | RiskViolation::Drawdown { .. }
        )
    }
}

/// Overall risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Level for a 0-100 risk score
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RiskLevel::Critical
        } else if score >= 60.0 {
            RiskLevel::High
        } else if score >= 30.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A risk decision, kept for the journal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskEvent {
    pub event_type: &'static str,
    pub description: String,
    pub symbol: Option<String>,
    pub strategy_name: Option<String>,
    pub trigger_value: Option<f64>,
    pub current_value: Option<f64>,
    pub action_taken: &'static str,
    pub severity: RiskLevel,
    pub timestamp: DateTime<Utc>,
}

/// A finished trade reported to the risk manager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeOutcome {
    pub pnl: f64,
    pub pnl_pct: f64,
    pub is_win: bool,
    pub symbol: Option<String>,
    pub strategy_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TradeOutcome {
    pub fn new(pnl: f64, pnl_pct: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            pnl,
            pnl_pct,
            is_win: pnl > 0.0,
            symbol: None,
            strategy_name: None,
            timestamp,
        }
    }

    pub fn with_source(mut self, symbol: impl Into<String>, strategy: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self.strategy_name = Some(strategy.into());
        self
    }
}

/// Snapshot of the risk state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    pub block_until: Option<DateTime<Utc>>,
    pub daily_pnl: f64,
    /// Sum of today's losing trade percentages, as a positive number
    pub daily_loss_pct: f64,
    pub consecutive_losses: u32,
    pub trades_today: u32,
    pub current_drawdown: f64,
    pub max_drawdown: f64,
    /// Percent of today's trades that were wins
    pub win_rate: f64,
    pub remaining_daily_risk: f64,
    pub trades_remaining: u32,
}
