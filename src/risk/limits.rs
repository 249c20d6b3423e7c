//! Risk limits, trading blocks and drawdown tracking

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Global risk limits, as configured under `[risk]`
pub use crate::config::RiskConfig as RiskLimits;

/// An active trading block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingBlock {
    pub reason: String,
    pub until: DateTime<Utc>,
}

impl TradingBlock {
    pub fn new(reason: impl Into<String>, now: DateTime<Utc>, hours: i64) -> Self {
        Self {
            reason: reason.into(),
            until: now + Duration::hours(hours),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.until
    }
}

/// Drawdown accumulated from losing trades, in percent
///
/// Losses add their magnitude; wins pay the drawdown back down to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DrawdownTracker {
    pub current: f64,
    pub max: f64,
}

impl DrawdownTracker {
    pub fn record(&mut self, pnl_pct: f64) {
        if pnl_pct < 0.0 {
            self.current += pnl_pct.abs();
            self.max = self.max.max(self.current);
        } else {
            self.current = (self.current - pnl_pct).max(0.0);
        }
    }
}
