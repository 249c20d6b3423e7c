//! Per-strategy runtime
//!
//! A runner owns one strategy instance and its open position. Each update
//! evaluates the strategy, gates the signal through the risk manager, places
//! orders through the execution engine and journals what happened.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::registry::{self, StrategyError, StrategyKind};
use super::types::{AnalysisError, MarketSnapshot, Signal, SignalType, Strategy};
use crate::bybit::{OrderRef, OrderRequest, Side};
use crate::config::StrategyConfig;
use crate::db::{Database, NewStrategyLog, NewTrade, StrategyAction};
use crate::execution::ExecutionEngine;
use crate::notify::TelegramNotifier;
use crate::risk::{ClosedPosition, ExitReason, Position, RiskManager, RiskViolation, TradeOutcome};
use crate::telemetry::{self, CounterMetric};

/// Confidence above which a signal is journaled
const SIGNAL_LOG_CONFIDENCE: f64 = 0.5;
const MAX_STOP_LOSS_PCT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerState {
    Stopped,
    Running,
    Paused,
    Error,
}

impl RunnerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Stopped => "stopped",
            RunnerState::Running => "running",
            RunnerState::Paused => "paused",
            RunnerState::Error => "error",
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("strategy {0} is already running")]
    AlreadyRunning(String),

    #[error("cannot {action} strategy in state {state}")]
    InvalidState {
        action: &'static str,
        state: RunnerState,
    },

    #[error("invalid strategy settings: {0}")]
    InvalidSettings(String),

    #[error("exchange connectivity check failed: {0}")]
    Connectivity(String),

    #[error("no open position")]
    NoPosition,

    #[error("fraction must be in (0, 1], got {0}")]
    InvalidFraction(f64),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("execution failed: {0}")]
    Execution(#[from] anyhow::Error),
}

/// Result of one update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The runner is not in the running state
    NotRunning,
    /// The strategy could not analyse the snapshot
    Skipped(AnalysisError),
    /// The risk manager refused the signal; the runner is now paused
    RiskRejected(RiskViolation),
    /// Nothing to do
    NoAction,
    Opened { side: Side, price: Decimal },
    Closed { reason: ExitReason, pnl: Decimal },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunnerStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub daily_pnl: Decimal,
    pub total_pnl: Decimal,
    pub last_update: Option<DateTime<Utc>>,
    pub last_signal: Option<Signal>,
    pub started_at: Option<DateTime<Utc>>,
}

impl RunnerStats {
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunnerStatus {
    pub name: String,
    pub kind: StrategyKind,
    pub symbol: String,
    pub state: RunnerState,
    pub session_id: Uuid,
    pub stats: RunnerStats,
    pub position: Option<Position>,
    pub uptime_secs: Option<i64>,
}

/// Services a runner talks to
#[derive(Clone)]
pub struct RunnerContext {
    pub execution: Arc<dyn ExecutionEngine>,
    pub risk: Arc<Mutex<RiskManager>>,
    pub db: Option<Database>,
    pub notifier: Arc<TelegramNotifier>,
}

impl RunnerContext {
    async fn journal(&self, event: NewStrategyLog) {
        if let Some(db) = &self.db {
            if let Err(e) = db.log_strategy_event(event).await {
                warn!(error = %e, "Failed to journal strategy event");
            }
        }
    }

    async fn journal_trade(&self, trade: NewTrade) {
        if let Some(db) = &self.db {
            if let Err(e) = db.record_trade(&trade).await {
                warn!(error = %e, order_id = %trade.order_id, "Failed to journal trade");
            }
        }
    }

    /// Write pending risk events to the journal
    pub async fn flush_risk_events(&self) {
        let events = self.risk.lock().await.drain_events();
        let Some(db) = &self.db else {
            return;
        };
        for event in events {
            if let Err(e) = db.log_risk_event(&event).await {
                warn!(error = %e, "Failed to journal risk event");
            }
        }
    }
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

pub struct StrategyRunner {
    config: StrategyConfig,
    kind: StrategyKind,
    strategy: Box<dyn Strategy>,
    ctx: RunnerContext,
    state: RunnerState,
    session_id: Uuid,
    stats: RunnerStats,
    stats_day: NaiveDate,
    position: Option<Position>,
    last_price: Option<Decimal>,
    current_order: Option<String>,
}

impl StrategyRunner {
    /// Build the strategy named by `config.kind` with `config.params`
    pub fn new(config: StrategyConfig, ctx: RunnerContext) -> Result<Self, RunnerError> {
        let strategy = registry::build_by_name(&config.kind, &config.params)?;
        Ok(Self::with_strategy(config, strategy, ctx))
    }

    pub fn with_strategy(
        config: StrategyConfig,
        strategy: Box<dyn Strategy>,
        ctx: RunnerContext,
    ) -> Self {
        Self {
            kind: strategy.kind(),
            config,
            strategy,
            ctx,
            state: RunnerState::Stopped,
            session_id: Uuid::new_v4(),
            stats: RunnerStats::default(),
            stats_day: Utc::now().date_naive(),
            position: None,
            last_price: None,
            current_order: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunnerState::Running
    }

    pub fn stats(&self) -> &RunnerStats {
        &self.stats
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn status(&self) -> RunnerStatus {
        RunnerStatus {
            name: self.config.name.clone(),
            kind: self.kind,
            symbol: self.config.symbol.clone(),
            state: self.state,
            session_id: self.session_id,
            stats: self.stats.clone(),
            position: self.position.clone(),
            uptime_secs: self
                .stats
                .started_at
                .filter(|_| self.state != RunnerState::Stopped)
                .map(|t| (Utc::now() - t).num_seconds()),
        }
    }

    fn validate_settings(&self) -> Result<(), RunnerError> {
        let c = &self.config;
        if c.symbol.trim().is_empty() {
            return Err(RunnerError::InvalidSettings("symbol is empty".into()));
        }
        if c.position_size <= Decimal::ZERO || c.position_size > c.max_position_size {
            return Err(RunnerError::InvalidSettings(format!(
                "position_size {} must be in (0, {}]",
                c.position_size, c.max_position_size
            )));
        }
        if c.stop_loss_pct <= 0.0 || c.stop_loss_pct > MAX_STOP_LOSS_PCT {
            return Err(RunnerError::InvalidSettings(format!(
                "stop_loss_pct {} must be in (0, {}]",
                c.stop_loss_pct, MAX_STOP_LOSS_PCT
            )));
        }
        Ok(())
    }

    pub async fn start(&mut self) -> Result<(), RunnerError> {
        if self.state == RunnerState::Running {
            return Err(RunnerError::AlreadyRunning(self.config.name.clone()));
        }
        if let Err(e) = self.validate_settings() {
            self.state = RunnerState::Error;
            return Err(e);
        }
        if let Err(e) = self.ctx.execution.server_time().await {
            self.state = RunnerState::Error;
            return Err(RunnerError::Connectivity(e.to_string()));
        }

        self.state = RunnerState::Running;
        self.session_id = Uuid::new_v4();
        self.stats.started_at = Some(Utc::now());
        info!(
            strategy = %self.config.name,
            kind = %self.kind,
            symbol = %self.config.symbol,
            session = %self.session_id,
            "Strategy started"
        );
        self.ctx
            .journal(
                self.log(StrategyAction::StrategyStarted)
                    .message(format!("Strategy {} started on {}", self.config.name, self.config.symbol))
                    .data(serde_json::json!({
                        "kind": self.kind.as_str(),
                        "session_id": self.session_id.to_string(),
                        "position_size": self.config.position_size.to_string(),
                        "stop_loss_pct": self.config.stop_loss_pct,
                        "take_profit_pct": self.config.take_profit_pct,
                    })),
            )
            .await;
        self.ctx
            .notifier
            .notify_strategy(&format!("Strategy <b>{}</b> started on {}", self.config.name, self.config.symbol))
            .await;
        Ok(())
    }

    /// Stop, closing any open position at the last known price
    pub async fn stop(&mut self) -> Result<(), RunnerError> {
        if self.state == RunnerState::Stopped {
            return Ok(());
        }
        if self.position.is_some() {
            if let Some(price) = self.last_price {
                if let Err(e) = self.close_position(price, ExitReason::Shutdown).await {
                    warn!(strategy = %self.config.name, error = %e, "Failed to close position on stop");
                }
            } else {
                warn!(strategy = %self.config.name, "No price to close position on stop");
            }
        }
        self.state = RunnerState::Stopped;
        info!(strategy = %self.config.name, "Strategy stopped");
        self.ctx
            .journal(self.log(StrategyAction::StrategyStopped).message("Strategy stopped"))
            .await;
        Ok(())
    }

    pub async fn pause(&mut self) -> Result<(), RunnerError> {
        if self.state != RunnerState::Running {
            return Err(RunnerError::InvalidState {
                action: "pause",
                state: self.state,
            });
        }
        self.state = RunnerState::Paused;
        info!(strategy = %self.config.name, "Strategy paused");
        self.ctx
            .journal(self.log(StrategyAction::StrategyPaused).message("Strategy paused"))
            .await;
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), RunnerError> {
        if self.state != RunnerState::Paused {
            return Err(RunnerError::InvalidState {
                action: "resume",
                state: self.state,
            });
        }
        self.state = RunnerState::Running;
        info!(strategy = %self.config.name, "Strategy resumed");
        self.ctx
            .journal(self.log(StrategyAction::StrategyResumed).message("Strategy resumed"))
            .await;
        Ok(())
    }

    /// Evaluate the strategy on a snapshot and act on the result
    pub async fn update(&mut self, snapshot: &MarketSnapshot) -> UpdateOutcome {
        if self.state != RunnerState::Running {
            return UpdateOutcome::NotRunning;
        }
        self.roll_day();
        self.last_price = Some(snapshot.price);
        self.stats.last_update = Some(Utc::now());

        let signal = match self.strategy.evaluate(snapshot) {
            Ok(signal) => signal,
            Err(e) => {
                debug!(strategy = %self.config.name, error = %e, "Analysis skipped");
                return UpdateOutcome::Skipped(e);
            }
        };
        self.stats.last_signal = Some(signal.clone());

        let outcome = match self.act_on(signal, snapshot.price).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(&e).await;
                return UpdateOutcome::NoAction;
            }
        };
        if matches!(outcome, UpdateOutcome::RiskRejected(_)) {
            return outcome;
        }

        match self.check_exit(snapshot.price).await {
            Ok(Some(closed)) => closed,
            Ok(None) => outcome,
            Err(e) => {
                self.fail(&e).await;
                outcome
            }
        }
    }

    /// Act on a signal produced outside the strategy
    pub async fn execute_external_signal(
        &mut self,
        signal: Signal,
        price: Decimal,
    ) -> Result<UpdateOutcome, RunnerError> {
        if self.state != RunnerState::Running {
            return Ok(UpdateOutcome::NotRunning);
        }
        self.last_price = Some(price);
        info!(strategy = %self.config.name, kind = %signal.kind, "External signal received");
        self.act_on(signal, price).await
    }

    async fn act_on(&mut self, signal: Signal, price: Decimal) -> Result<UpdateOutcome, RunnerError> {
        if signal.confidence > SIGNAL_LOG_CONFIDENCE {
            telemetry::increment(CounterMetric::SignalsGenerated);
            self.ctx
                .journal(
                    self.log(StrategyAction::SignalGenerated)
                        .details(format!("{} confidence={:.2}", signal.kind, signal.confidence))
                        .message(signal.reason.clone())
                        .data(serde_json::json!({
                            "signal": signal.kind.as_str(),
                            "confidence": signal.confidence,
                            "price": price.to_string(),
                        })),
                )
                .await;
        }
        if signal.is_hold() {
            return Ok(UpdateOutcome::NoAction);
        }

        let position_pct = self.config.position_size.to_f64().unwrap_or_default() * 100.0;
        let verdict = self.ctx.risk.lock().await.check_trade_allowed(
            signal.confidence,
            position_pct,
            self.config.stop_loss_pct,
            Utc::now(),
        );
        self.ctx.flush_risk_events().await;
        if let Err(violation) = verdict {
            telemetry::increment(CounterMetric::RiskRejections);
            warn!(strategy = %self.config.name, reason = %violation, "Signal rejected by risk manager");
            self.state = RunnerState::Paused;
            self.ctx
                .journal(
                    self.log(StrategyAction::RiskRejected)
                        .message(violation.to_string())
                        .details(format!("{} confidence={:.2}", signal.kind, signal.confidence)),
                )
                .await;
            if violation.blocks_trading() {
                let alert = format!("<b>{}</b>: trading blocked\n{}", self.config.name, violation);
                if let Err(e) = self.ctx.notifier.send_notification("alert", &alert, true).await {
                    warn!(error = %e, "Risk alert failed");
                }
            }
            return Ok(UpdateOutcome::RiskRejected(violation));
        }

        if signal.confidence < self.config.min_confidence {
            debug!(
                strategy = %self.config.name,
                confidence = signal.confidence,
                min = self.config.min_confidence,
                "Signal below strategy confidence"
            );
            return Ok(UpdateOutcome::NoAction);
        }

        let long = self.position.as_ref().map(|p| p.is_long());
        if let (Some(side), None) = (signal.kind.entry_side(), long) {
            return self.open_position(side, price).await;
        }
        match (signal.kind, long) {
            (SignalType::CloseLong, Some(true)) | (SignalType::CloseShort, Some(false)) => {
                let closed = self.close_position(price, ExitReason::Signal).await?;
                Ok(UpdateOutcome::Closed {
                    reason: closed.reason,
                    pnl: closed.pnl,
                })
            }
            _ => Ok(UpdateOutcome::NoAction),
        }
    }

    async fn open_position(&mut self, side: Side, price: Decimal) -> Result<UpdateOutcome, RunnerError> {
        let qty = self.config.position_size;
        let order = OrderRequest::market(&self.config.symbol, side, qty);
        let ack = self.ctx.execution.submit_order(order, price).await?;
        let fill_price = ack.fill_price().unwrap_or(price);
        self.current_order = Some(ack.order_id.clone());

        let position = Position::open(
            &self.config.symbol,
            side,
            fill_price,
            qty,
            decimal(self.config.stop_loss_pct),
            decimal(self.config.take_profit_pct),
            &ack.order_id,
        );
        self.strategy.on_fill(
            side,
            fill_price.to_f64().unwrap_or_default(),
            qty.to_f64().unwrap_or_default(),
        );

        let direction = if side == Side::Buy { "long" } else { "short" };
        info!(
            strategy = %self.config.name,
            symbol = %self.config.symbol,
            direction,
            price = %fill_price,
            qty = %qty,
            stop_loss = %position.stop_loss,
            take_profit = %position.take_profit,
            "Position opened"
        );
        self.ctx
            .journal_trade(
                NewTrade::market(&ack.order_id, &self.config.symbol, side, qty, fill_price)
                    .for_strategy(&self.config.name),
            )
            .await;
        self.ctx
            .journal(
                self.log(StrategyAction::PositionOpened)
                    .message(format!("Opened {} {} at {}", direction, qty, fill_price))
                    .data(serde_json::json!({
                        "order_id": ack.order_id,
                        "stop_loss": position.stop_loss.to_string(),
                        "take_profit": position.take_profit.to_string(),
                    })),
            )
            .await;
        self.ctx
            .notifier
            .notify_trade(&format!(
                "<b>{}</b>: opened {} {} {} at {}\nSL {} / TP {}",
                self.config.name,
                direction,
                qty,
                self.config.symbol,
                fill_price,
                position.stop_loss.round_dp(8),
                position.take_profit.round_dp(8)
            ))
            .await;

        self.position = Some(position);
        Ok(UpdateOutcome::Opened {
            side,
            price: fill_price,
        })
    }

    async fn close_position(
        &mut self,
        price: Decimal,
        reason: ExitReason,
    ) -> Result<ClosedPosition, RunnerError> {
        let position = self.position.clone().ok_or(RunnerError::NoPosition)?;
        let side = position.side.opposite();
        let order = OrderRequest::market(&self.config.symbol, side, position.size);
        let ack = self.ctx.execution.submit_order(order, price).await?;
        let exit_price = ack.fill_price().unwrap_or(price);
        self.position = None;
        self.current_order = None;

        let closed = ClosedPosition::new(position, exit_price, reason);
        self.strategy.on_fill(
            side,
            exit_price.to_f64().unwrap_or_default(),
            closed.position.size.to_f64().unwrap_or_default(),
        );
        self.record_result(closed.pnl, closed.pnl_pct).await;

        info!(
            strategy = %self.config.name,
            reason = reason.as_str(),
            exit_price = %exit_price,
            pnl = %closed.pnl,
            pnl_pct = closed.pnl_pct,
            "Position closed"
        );
        self.ctx
            .journal_trade(
                NewTrade::market(&ack.order_id, &self.config.symbol, side, closed.position.size, exit_price)
                    .for_strategy(&self.config.name)
                    .with_pnl(closed.pnl),
            )
            .await;
        self.ctx
            .journal(
                self.log(StrategyAction::PositionClosed)
                    .message(format!(
                        "Closed at {} ({}): PnL {} ({:.2}%)",
                        exit_price,
                        reason.as_str(),
                        closed.pnl.round_dp(4),
                        closed.pnl_pct
                    ))
                    .data(serde_json::json!({
                        "order_id": ack.order_id,
                        "reason": reason.as_str(),
                        "pnl": closed.pnl.to_string(),
                        "pnl_pct": closed.pnl_pct,
                    })),
            )
            .await;
        self.ctx
            .notifier
            .notify_trade(&format!(
                "<b>{}</b>: closed {} at {} ({})\nPnL {} ({:.2}%)",
                self.config.name,
                self.config.symbol,
                exit_price,
                reason.as_str(),
                closed.pnl.round_dp(4),
                closed.pnl_pct
            ))
            .await;
        Ok(closed)
    }

    async fn record_result(&mut self, pnl: Decimal, pnl_pct: f64) {
        self.stats.total_trades += 1;
        if pnl > Decimal::ZERO {
            self.stats.winning_trades += 1;
        } else {
            self.stats.losing_trades += 1;
        }
        self.stats.daily_pnl += pnl;
        self.stats.total_pnl += pnl;

        let outcome = TradeOutcome::new(pnl.to_f64().unwrap_or_default(), pnl_pct, Utc::now())
            .with_source(&self.config.symbol, &self.config.name);
        self.ctx.risk.lock().await.record_trade(outcome);
        self.ctx.flush_risk_events().await;
    }

    async fn check_exit(&mut self, price: Decimal) -> Result<Option<UpdateOutcome>, RunnerError> {
        let Some(reason) = self.position.as_ref().and_then(|p| p.exit_trigger(price)) else {
            return Ok(None);
        };
        let closed = self.close_position(price, reason).await?;
        Ok(Some(UpdateOutcome::Closed {
            reason: closed.reason,
            pnl: closed.pnl,
        }))
    }

    /// Move the stops on the exchange and locally
    pub async fn update_stop_loss_take_profit(
        &mut self,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<(), RunnerError> {
        if self.position.is_none() {
            return Err(RunnerError::NoPosition);
        }
        self.ctx
            .execution
            .set_trading_stop(&self.config.symbol, take_profit, stop_loss)
            .await?;
        if let Some(position) = self.position.as_mut() {
            if let Some(sl) = stop_loss {
                position.stop_loss = sl;
            }
            if let Some(tp) = take_profit {
                position.take_profit = tp;
            }
        }
        info!(strategy = %self.config.name, ?stop_loss, ?take_profit, "Stops updated");
        self.ctx
            .journal(self.log(StrategyAction::StopsUpdated).data(serde_json::json!({
                "stop_loss": stop_loss.map(|d| d.to_string()),
                "take_profit": take_profit.map(|d| d.to_string()),
            })))
            .await;
        Ok(())
    }

    /// Close `fraction` of the open position with a reduce-only order.
    /// Returns the realised PnL of the closed part.
    pub async fn partial_close(&mut self, fraction: f64, price: Decimal) -> Result<Decimal, RunnerError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(RunnerError::InvalidFraction(fraction));
        }
        let position = self.position.clone().ok_or(RunnerError::NoPosition)?;
        if fraction == 1.0 {
            let closed = self.close_position(price, ExitReason::Manual).await?;
            return Ok(closed.pnl);
        }

        let qty = (position.size * decimal(fraction)).normalize();
        let side = position.side.opposite();
        let order = OrderRequest::market(&self.config.symbol, side, qty).reduce_only();
        let ack = self.ctx.execution.submit_order(order, price).await?;
        let exit_price = ack.fill_price().unwrap_or(price);

        let mut part = position.clone();
        part.size = qty;
        let pnl = part.pnl(exit_price);
        let pnl_pct = part.pnl_pct(exit_price);
        if let Some(open) = self.position.as_mut() {
            open.size -= qty;
        }
        self.strategy.on_fill(
            side,
            exit_price.to_f64().unwrap_or_default(),
            qty.to_f64().unwrap_or_default(),
        );
        self.record_result(pnl, pnl_pct).await;

        info!(strategy = %self.config.name, %qty, %exit_price, %pnl, "Partial close");
        self.ctx
            .journal_trade(
                NewTrade::market(&ack.order_id, &self.config.symbol, side, qty, exit_price)
                    .for_strategy(&self.config.name)
                    .with_pnl(pnl),
            )
            .await;
        self.ctx
            .journal(
                self.log(StrategyAction::PartialClose)
                    .message(format!("Closed {:.0}% at {}", fraction * 100.0, exit_price)),
            )
            .await;
        Ok(pnl)
    }

    /// Cancel the last order this runner placed, if any
    pub async fn cancel_current_order(&mut self) -> Result<bool, RunnerError> {
        let Some(order_id) = self.current_order.take() else {
            return Ok(false);
        };
        self.ctx
            .execution
            .cancel_order(&self.config.symbol, OrderRef::Id(order_id.clone()))
            .await?;
        info!(strategy = %self.config.name, %order_id, "Order cancelled");
        Ok(true)
    }

    fn roll_day(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.stats_day {
            self.stats_day = today;
            self.stats.daily_pnl = Decimal::ZERO;
        }
    }

    async fn fail(&mut self, error: &RunnerError) {
        self.state = RunnerState::Error;
        warn!(strategy = %self.config.name, error = %error, "Strategy error");
        self.ctx
            .journal(self.log(StrategyAction::Error).message(error.to_string()))
            .await;
        self.ctx
            .notifier
            .notify_error(&format!("Strategy <b>{}</b>: {}", self.config.name, error))
            .await;
    }

    fn log(&self, action: StrategyAction) -> NewStrategyLog {
        NewStrategyLog::new(&self.config.name, action).symbol(&self.config.symbol)
    }
}
