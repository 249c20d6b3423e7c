//! Risk management module
//!
//! Trade gating, daily limits, drawdown tracking and position bookkeeping

mod limits;
mod manager;
mod position;
mod types;

pub use limits::{DrawdownTracker, RiskLimits, TradingBlock};
pub use manager::RiskManager;
pub use position::{ClosedPosition, ExitReason, Position};
pub use types::{RiskAssessment, RiskEvent, RiskLevel, RiskViolation, TradeOutcome};
