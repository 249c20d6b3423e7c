//! Global risk manager
//!
//! Gates every trade against the configured limits, tracks daily results and
//! drawdown, and blocks trading for a period when a hard limit is breached.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fmt::Write as _;
use tracing::{info, warn};

use super::limits::{DrawdownTracker, RiskLimits, TradingBlock};
use super::types::{RiskAssessment, RiskEvent, RiskLevel, RiskViolation, TradeOutcome};

const DAILY_LOSS_BLOCK_HOURS: i64 = 24;
const CONSECUTIVE_LOSS_BLOCK_HOURS: i64 = 4;
const DRAWDOWN_BLOCK_HOURS: i64 = 12;
const TRADE_RETENTION_DAYS: i64 = 7;

pub struct RiskManager {
    limits: RiskLimits,
    block: Option<TradingBlock>,
    consecutive_losses: u32,
    drawdown: DrawdownTracker,
    trades: Vec<TradeOutcome>,
    current_day: NaiveDate,
    events: Vec<RiskEvent>,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        info!(
            max_daily_loss_pct = limits.max_daily_loss_pct,
            max_consecutive_losses = limits.max_consecutive_losses,
            max_stop_loss_pct = limits.max_stop_loss_pct,
            "Risk manager initialized"
        );
        Self {
            limits,
            block: None,
            consecutive_losses: 0,
            drawdown: DrawdownTracker::default(),
            trades: Vec::new(),
            current_day: Utc::now().date_naive(),
            events: Vec::new(),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Decide whether a new trade may be opened
    pub fn check_trade_allowed(
        &mut self,
        confidence: f64,
        position_pct: f64,
        stop_loss_pct: f64,
        now: DateTime<Utc>,
    ) -> Result<(), RiskViolation> {
        self.roll_day(now);

        if let Some(block) = self.block.clone() {
            if block.is_active(now) {
                return Err(RiskViolation::Blocked {
                    reason: block.reason,
                    until: block.until,
                });
            }
            self.block = None;
            self.push_event(
                "trading_unblocked",
                format!("Trading unblocked, previous reason: {}", block.reason),
                None,
                None,
                "Trading unblocked",
                RiskLevel::Low,
                now,
            );
            info!(reason = %block.reason, "Trading unblocked");
        }

        let daily_loss = self.daily_loss_pct(now);
        if daily_loss >= self.limits.max_daily_loss_pct {
            let violation = RiskViolation::DailyLoss {
                current: daily_loss,
                limit: self.limits.max_daily_loss_pct,
            };
            return Err(self.block_trading(
                violation,
                "daily_loss_limit_exceeded",
                DAILY_LOSS_BLOCK_HOURS,
                now,
            ));
        }

        if self.consecutive_losses >= self.limits.max_consecutive_losses {
            let violation = RiskViolation::ConsecutiveLosses {
                current: self.consecutive_losses,
                limit: self.limits.max_consecutive_losses,
            };
            return Err(self.block_trading(
                violation,
                "consecutive_losses_limit_exceeded",
                CONSECUTIVE_LOSS_BLOCK_HOURS,
                now,
            ));
        }

        if stop_loss_pct > self.limits.max_stop_loss_pct {
            return Err(self.reject(
                RiskViolation::StopLossTooWide {
                    current: stop_loss_pct,
                    limit: self.limits.max_stop_loss_pct,
                },
                "stop_loss_limit_exceeded",
                now,
            ));
        }

        if position_pct > self.limits.max_position_size_pct {
            return Err(self.reject(
                RiskViolation::PositionTooLarge {
                    current: position_pct,
                    limit: self.limits.max_position_size_pct,
                },
                "position_size_limit_exceeded",
                now,
            ));
        }

        if confidence < self.limits.min_confidence_threshold {
            return Err(self.reject(
                RiskViolation::LowConfidence {
                    current: confidence,
                    limit: self.limits.min_confidence_threshold,
                },
                "low_confidence_signal",
                now,
            ));
        }

        let trades_today = self.trades_today(now);
        if trades_today >= self.limits.max_trades_per_day {
            return Err(self.reject(
                RiskViolation::TooManyTrades {
                    current: trades_today,
                    limit: self.limits.max_trades_per_day,
                },
                "daily_trades_limit_exceeded",
                now,
            ));
        }

        if self.drawdown.current >= self.limits.max_drawdown_pct {
            let violation = RiskViolation::Drawdown {
                current: self.drawdown.current,
                limit: self.limits.max_drawdown_pct,
            };
            return Err(self.block_trading(
                violation,
                "max_drawdown_exceeded",
                DRAWDOWN_BLOCK_HOURS,
                now,
            ));
        }

        self.push_event(
            "trade_approved",
            format!(
                "Trade approved: size {:.2}%, confidence {:.2}, stop loss {:.2}%",
                position_pct, confidence, stop_loss_pct
            ),
            None,
            Some(confidence),
            "Trade approved",
            RiskLevel::Low,
            now,
        );
        Ok(())
    }

    /// Record a finished trade
    pub fn record_trade(&mut self, outcome: TradeOutcome) {
        self.roll_day(outcome.timestamp);

        if outcome.is_win {
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
        }
        self.drawdown.record(outcome.pnl_pct);

        let mut event = self.event(
            "trade_completed",
            format!(
                "Trade completed: PnL {:.2}% ({})",
                outcome.pnl_pct,
                if outcome.is_win { "win" } else { "loss" }
            ),
            None,
            Some(outcome.pnl_pct),
            "Risk metrics updated",
            RiskLevel::Low,
            outcome.timestamp,
        );
        event.symbol = outcome.symbol.clone();
        event.strategy_name = outcome.strategy_name.clone();
        self.events.push(event);

        info!(
            pnl_pct = outcome.pnl_pct,
            is_win = outcome.is_win,
            consecutive_losses = self.consecutive_losses,
            drawdown = self.drawdown.current,
            "Trade recorded"
        );
        self.trades.push(outcome);
    }

    pub fn assessment(&mut self, now: DateTime<Utc>) -> RiskAssessment {
        self.roll_day(now);

        let daily_loss_pct = self.daily_loss_pct(now);
        let trades_today = self.trades_today(now);
        let today: Vec<&TradeOutcome> = self.today(now).collect();
        let daily_pnl = today.iter().map(|t| t.pnl).sum();
        let win_rate = if today.is_empty() {
            0.0
        } else {
            today.iter().filter(|t| t.is_win).count() as f64 / today.len() as f64 * 100.0
        };

        let risk_score = self.risk_score(daily_loss_pct, trades_today);
        let block = self.block.as_ref().filter(|b| b.is_active(now));

        RiskAssessment {
            risk_level: RiskLevel::from_score(risk_score),
            risk_score,
            is_blocked: block.is_some(),
            block_reason: block.map(|b| b.reason.clone()),
            block_until: block.map(|b| b.until),
            daily_pnl,
            daily_loss_pct,
            consecutive_losses: self.consecutive_losses,
            trades_today,
            current_drawdown: self.drawdown.current,
            max_drawdown: self.drawdown.max,
            win_rate,
            remaining_daily_risk: (self.limits.max_daily_loss_pct - daily_loss_pct).max(0.0),
            trades_remaining: self.limits.max_trades_per_day.saturating_sub(trades_today),
        }
    }

    /// Human-readable risk report
    pub fn detailed_report(&mut self, now: DateTime<Utc>) -> String {
        let a = self.assessment(now);
        let l = &self.limits;
        let mut report = String::new();

        let _ = writeln!(report, "=== RISK MANAGEMENT REPORT ===");
        let _ = writeln!(report);
        let _ = writeln!(report, "Risk level: {}", a.risk_level.as_str().to_uppercase());
        let _ = writeln!(
            report,
            "Trading status: {}",
            if a.is_blocked { "BLOCKED" } else { "ACTIVE" }
        );
        let _ = writeln!(report);
        let _ = writeln!(report, "Daily figures:");
        let _ = writeln!(
            report,
            "- Losses: {:.2}% (limit: {}%)",
            a.daily_loss_pct, l.max_daily_loss_pct
        );
        let _ = writeln!(
            report,
            "- Trades today: {} (limit: {})",
            a.trades_today, l.max_trades_per_day
        );
        let _ = writeln!(
            report,
            "- Consecutive losses: {} (limit: {})",
            a.consecutive_losses, l.max_consecutive_losses
        );
        let _ = writeln!(report, "- Win rate: {:.1}%", a.win_rate);
        let _ = writeln!(report);
        let _ = writeln!(report, "Drawdown:");
        let _ = writeln!(report, "- Current: {:.2}%", a.current_drawdown);
        let _ = writeln!(report, "- Maximum: {:.2}%", a.max_drawdown);
        let _ = writeln!(report);
        let _ = writeln!(report, "Remaining limits:");
        let _ = writeln!(report, "- Daily risk: {:.2}%", a.remaining_daily_risk);
        let _ = writeln!(report, "- Trades left: {}", a.trades_remaining);

        if let (Some(until), Some(reason)) = (a.block_until, a.block_reason) {
            let _ = writeln!(report);
            let _ = writeln!(report, "Blocked until: {}", until.format("%Y-%m-%d %H:%M:%S UTC"));
            let _ = writeln!(report, "Reason: {}", reason);
        }
        report
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.block.as_ref().is_some_and(|b| b.is_active(now))
    }

    pub fn force_unblock(&mut self) {
        if let Some(block) = self.block.take() {
            warn!(reason = %block.reason, "Trading force-unblocked");
        }
    }

    /// Clear today's trades and the loss streak
    pub fn reset_daily_stats(&mut self) {
        let today = self.current_day;
        self.trades.retain(|t| t.timestamp.date_naive() != today);
        self.consecutive_losses = 0;
        info!("Daily risk statistics reset");
    }

    pub fn update_limits(&mut self, limits: RiskLimits) {
        if limits != self.limits {
            info!(?limits, "Risk limits updated");
        }
        self.limits = limits;
    }

    /// Take the events produced since the last drain
    pub fn drain_events(&mut self) -> Vec<RiskEvent> {
        std::mem::take(&mut self.events)
    }

    fn today(&self, now: DateTime<Utc>) -> impl Iterator<Item = &TradeOutcome> {
        let day = now.date_naive();
        self.trades
            .iter()
            .filter(move |t| t.timestamp.date_naive() == day)
    }

    fn trades_today(&self, now: DateTime<Utc>) -> u32 {
        self.today(now).count() as u32
    }

    fn daily_loss_pct(&self, now: DateTime<Utc>) -> f64 {
        self.today(now)
            .filter(|t| t.pnl_pct < 0.0)
            .map(|t| t.pnl_pct.abs())
            .sum()
    }

    fn risk_score(&self, daily_loss_pct: f64, trades_today: u32) -> f64 {
        let ratio = |value: f64, limit: f64| if limit > 0.0 { value / limit } else { 0.0 };
        let l = &self.limits;
        let score = ratio(daily_loss_pct, l.max_daily_loss_pct) * 40.0
            + ratio(self.consecutive_losses as f64, l.max_consecutive_losses as f64) * 30.0
            + ratio(self.drawdown.current, l.max_drawdown_pct) * 20.0
            + ratio(trades_today as f64, l.max_trades_per_day as f64) * 10.0;
        score.min(100.0)
    }

    fn roll_day(&mut self, now: DateTime<Utc>) {
        let day = now.date_naive();
        if day == self.current_day {
            return;
        }
        self.current_day = day;
        let cutoff = now - Duration::days(TRADE_RETENTION_DAYS);
        self.trades.retain(|t| t.timestamp > cutoff);
        info!(%day, "Daily risk metrics rolled over");
    }

    fn block_trading(
        &mut self,
        violation: RiskViolation,
        event_type: &'static str,
        hours: i64,
        now: DateTime<Utc>,
    ) -> RiskViolation {
        let block = TradingBlock::new(violation.to_string(), now, hours);
        warn!(reason = %block.reason, until = %block.until, "Trading blocked");
        let (trigger, current) = violation_values(&violation);
        self.push_event(
            event_type,
            violation.to_string(),
            trigger,
            current,
            "Trading blocked",
            RiskLevel::High,
            now,
        );
        self.block = Some(block);
        violation
    }

    fn reject(
        &mut self,
        violation: RiskViolation,
        event_type: &'static str,
        now: DateTime<Utc>,
    ) -> RiskViolation {
        let (trigger, current) = violation_values(&violation);
        self.push_event(
            event_type,
            violation.to_string(),
            trigger,
            current,
            "Trade rejected",
            RiskLevel::Medium,
            now,
        );
        violation
    }

    #[allow(clippy::too_many_arguments)]
    fn event(
        &self,
        event_type: &'static str,
        description: String,
        trigger_value: Option<f64>,
        current_value: Option<f64>,
        action_taken: &'static str,
        severity: RiskLevel,
        timestamp: DateTime<Utc>,
    ) -> RiskEvent {
        RiskEvent {
            event_type,
            description,
            symbol: None,
            strategy_name: None,
            trigger_value,
            current_value,
            action_taken,
            severity,
            timestamp,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_event(
        &mut self,
        event_type: &'static str,
        description: String,
        trigger_value: Option<f64>,
        current_value: Option<f64>,
        action_taken: &'static str,
        severity: RiskLevel,
        timestamp: DateTime<Utc>,
    ) {
        if severity >= RiskLevel::Medium {
            warn!(event_type, severity = %severity, "{}", description);
        }
        let event = self.event(
            event_type,
            description,
            trigger_value,
            current_value,
            action_taken,
            severity,
            timestamp,
        );
        self.events.push(event);
    }
}

/// (limit, observed) pair for the journal
fn violation_values(violation: &RiskViolation) -> (Option<f64>, Option<f64>) {
    match *violation {
        RiskViolation::Blocked { .. } => (None, None),
        RiskViolation::DailyLoss { current, limit }
        | RiskViolation::StopLossTooWide { current, limit }
        | RiskViolation::PositionTooLarge { current, limit }
        | RiskViolation::LowConfidence { current, limit }
        | RiskViolation::Drawdown { current, limit } => (Some(limit), Some(current)),
        RiskViolation::ConsecutiveLosses { current, limit }
        | RiskViolation::TooManyTrades { current, limit } => {
            (Some(limit as f64), Some(current as f64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn manager() -> RiskManager {
        let mut rm = RiskManager::new(RiskLimits::default());
        rm.current_day = noon().date_naive();
        rm
    }

    fn loss(pct: f64, at: DateTime<Utc>) -> TradeOutcome {
        TradeOutcome::new(-pct, -pct, at)
    }

    #[test]
    fn test_approves_reasonable_trade() {
        let mut rm = manager();
        assert_eq!(rm.check_trade_allowed(0.8, 5.0, 2.0, noon()), Ok(()));
        let events = rm.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "trade_approved");
        assert!(rm.drain_events().is_empty());
    }

    #[test]
    fn test_rejections_in_order() {
        let mut rm = manager();
        assert!(matches!(
            rm.check_trade_allowed(0.9, 5.0, 45.0, noon()),
            Err(RiskViolation::StopLossTooWide { .. })
        ));
        assert!(matches!(
            rm.check_trade_allowed(0.9, 15.0, 2.0, noon()),
            Err(RiskViolation::PositionTooLarge { .. })
        ));
        assert!(matches!(
            rm.check_trade_allowed(0.5, 5.0, 2.0, noon()),
            Err(RiskViolation::LowConfidence { .. })
        ));
        // Rejections do not block
        assert!(!rm.is_blocked(noon()));
        let low = rm.check_trade_allowed(0.5, 5.0, 2.0, noon()).unwrap_err();
        assert!(!low.blocks_trading());
        let events = rm.drain_events();
        assert!(events.iter().all(|e| e.action_taken == "Trade rejected"));
    }

    #[test]
    fn test_consecutive_losses_block_four_hours() {
        let mut rm = manager();
        for i in 0..3 {
            rm.record_trade(loss(1.0, noon() + Duration::minutes(i)));
        }
        let now = noon() + Duration::minutes(10);
        let err = rm.check_trade_allowed(0.9, 5.0, 2.0, now).unwrap_err();
        assert_eq!(err, RiskViolation::ConsecutiveLosses { current: 3, limit: 3 });
        assert!(err.blocks_trading());
        assert!(rm.is_blocked(now + Duration::hours(3)));

        let err = rm
            .check_trade_allowed(0.9, 5.0, 2.0, now + Duration::hours(1))
            .unwrap_err();
        assert!(matches!(err, RiskViolation::Blocked { .. }));
        assert!(err.blocks_trading());
        assert!(!rm.is_blocked(now + Duration::hours(4)));
    }

    #[test]
    fn test_unblock_after_expiry_logs_event() {
        let mut rm = manager();
        for i in 0..3 {
            rm.record_trade(loss(1.0, noon() + Duration::minutes(i)));
        }
        let _ = rm.check_trade_allowed(0.9, 5.0, 2.0, noon());
        rm.record_trade(TradeOutcome::new(5.0, 5.0, noon() + Duration::minutes(5)));
        rm.drain_events();

        let later = noon() + Duration::hours(5);
        assert_eq!(rm.check_trade_allowed(0.9, 5.0, 2.0, later), Ok(()));
        let types: Vec<_> = rm.drain_events().iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec!["trading_unblocked", "trade_approved"]);
    }

    #[test]
    fn test_daily_loss_blocks_for_a_day() {
        let mut rm = manager();
        rm.record_trade(loss(12.0, noon()));
        rm.record_trade(TradeOutcome::new(1.0, 1.0, noon()));
        rm.record_trade(loss(9.0, noon()));
        let err = rm.check_trade_allowed(0.9, 5.0, 2.0, noon()).unwrap_err();
        assert!(matches!(err, RiskViolation::DailyLoss { current, .. } if current == 21.0));
        assert!(rm.is_blocked(noon() + Duration::hours(23)));
    }

    #[test]
    fn test_drawdown_and_daily_trade_limits() {
        let mut rm = manager();
        rm.update_limits(RiskLimits {
            max_daily_loss_pct: 100.0,
            max_consecutive_losses: 10,
            max_trades_per_day: 2,
            ..RiskLimits::default()
        });
        rm.record_trade(loss(8.0, noon()));
        rm.record_trade(TradeOutcome::new(1.0, 1.0, noon()));
        assert!(matches!(
            rm.check_trade_allowed(0.9, 5.0, 2.0, noon()),
            Err(RiskViolation::TooManyTrades { current: 2, limit: 2 })
        ));

        let tomorrow = noon() + Duration::days(1);
        rm.record_trade(loss(9.0, tomorrow));
        let err = rm.check_trade_allowed(0.9, 5.0, 2.0, tomorrow).unwrap_err();
        assert!(matches!(err, RiskViolation::Drawdown { current, .. } if current == 16.0));
        assert!(rm.is_blocked(tomorrow + Duration::hours(11)));
    }

    #[test]
    fn test_assessment_and_report() {
        let mut rm = manager();
        rm.record_trade(TradeOutcome::new(10.0, 2.0, noon()));
        rm.record_trade(loss(4.0, noon()));
        let a = rm.assessment(noon());
        assert_eq!(a.trades_today, 2);
        assert_eq!(a.daily_loss_pct, 4.0);
        assert_eq!(a.win_rate, 50.0);
        assert_eq!(a.remaining_daily_risk, 16.0);
        assert_eq!(a.trades_remaining, 8);
        assert_eq!(a.daily_pnl, 6.0);
        // 40*0.2 + 30/3 + 20*4/15 + 10*0.2
        assert!((a.risk_score - 25.333).abs() < 0.01);
        assert_eq!(a.risk_level, RiskLevel::Low);

        let report = rm.detailed_report(noon());
        assert!(report.contains("Risk level: LOW"));
        assert!(report.contains("Trading status: ACTIVE"));
        assert!(report.contains("Trades today: 2 (limit: 10)"));
    }

    #[test]
    fn test_day_rollover_prunes_old_trades() {
        let mut rm = manager();
        rm.record_trade(loss(1.0, noon()));
        let next_week = noon() + Duration::days(8);
        let a = rm.assessment(next_week);
        assert_eq!(a.trades_today, 0);
        assert!(rm.trades.is_empty());
    }

    #[test]
    fn test_force_unblock_and_reset() {
        let mut rm = manager();
        for _ in 0..3 {
            rm.record_trade(loss(1.0, noon()));
        }
        let _ = rm.check_trade_allowed(0.9, 5.0, 2.0, noon());
        assert!(rm.is_blocked(noon()));
        rm.force_unblock();
        rm.reset_daily_stats();
        assert!(!rm.is_blocked(noon()));
        assert_eq!(rm.check_trade_allowed(0.9, 5.0, 2.0, noon()), Ok(()));
    }
}
