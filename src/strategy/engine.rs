//! Strategy engine
//!
//! Owns every registered runner, feeds running strategies with cached
//! market data on a fixed interval and takes periodic performance snapshots.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};

use super::runner::{RunnerContext, RunnerError, RunnerStatus, StrategyRunner, UpdateOutcome};
use super::types::MarketSnapshot;
use crate::bybit::{BybitClient, Kline, Ticker};
use crate::config::{EngineConfig, StrategyConfig};
use crate::db::PerformanceSnapshot;
use crate::telemetry::{self, GaugeMetric, LatencyMetric};

/// Source of ticker and kline data for a symbol
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn ticker(&self, symbol: &str) -> Result<Ticker>;

    /// Every spot ticker
    async fn all_tickers(&self) -> Result<Vec<Ticker>>;

    /// Klines for a timeframe such as `1m`, oldest first
    async fn klines(&self, symbol: &str, timeframe: &str, limit: u32) -> Result<Vec<Kline>>;
}

#[async_trait]
impl MarketFeed for BybitClient {
    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        Ok(BybitClient::ticker(self, symbol).await?)
    }

    async fn all_tickers(&self) -> Result<Vec<Ticker>> {
        Ok(self.tickers(None).await?)
    }

    async fn klines(&self, symbol: &str, timeframe: &str, limit: u32) -> Result<Vec<Kline>> {
        Ok(self.historical_klines(symbol, timeframe, limit).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("strategy '{0}' is already registered")]
    Duplicate(String),

    #[error("strategy '{0}' is not registered")]
    NotFound(String),

    #[error("{running} strategies running, limit is {max}")]
    TooManyRunning { running: usize, max: usize },

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: usize,
    pub total: usize,
    pub max_concurrent: usize,
    pub uptime_secs: Option<i64>,
    pub cache_size: usize,
}

fn runner_mut<'a>(
    runners: &'a mut HashMap<String, StrategyRunner>,
    name: &str,
) -> Result<&'a mut StrategyRunner, EngineError> {
    runners
        .get_mut(name)
        .ok_or_else(|| EngineError::NotFound(name.to_string()))
}

struct CachedMarket {
    ticker: Ticker,
    klines: Vec<Kline>,
    fetched_at: Instant,
}

pub struct StrategyEngine<F: MarketFeed> {
    feed: Arc<F>,
    ctx: RunnerContext,
    config: EngineConfig,
    runners: RwLock<HashMap<String, StrategyRunner>>,
    cache: Mutex<HashMap<String, CachedMarket>>,
    started_at: RwLock<Option<DateTime<Utc>>>,
}

impl<F: MarketFeed + 'static> StrategyEngine<F> {
    pub fn new(feed: Arc<F>, ctx: RunnerContext, config: EngineConfig) -> Self {
        Self {
            feed,
            ctx,
            config,
            runners: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            started_at: RwLock::new(None),
        }
    }

    pub fn context(&self) -> &RunnerContext {
        &self.ctx
    }

    /// Build and register a runner for `config`
    pub async fn register(&self, config: StrategyConfig) -> Result<(), EngineError> {
        let runner = StrategyRunner::new(config, self.ctx.clone())?;
        self.register_runner(runner).await
    }

    pub async fn register_runner(&self, runner: StrategyRunner) -> Result<(), EngineError> {
        let mut runners = self.runners.write().await;
        let name = runner.name().to_string();
        if runners.contains_key(&name) {
            return Err(EngineError::Duplicate(name));
        }
        info!(strategy = %name, symbol = %runner.symbol(), "Strategy registered");
        runners.insert(name, runner);
        Ok(())
    }

    /// Stop and remove a strategy
    pub async fn unregister(&self, name: &str) -> Result<(), EngineError> {
        let mut runners = self.runners.write().await;
        let mut runner = runners
            .remove(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        runner.stop().await?;
        info!(strategy = %name, "Strategy unregistered");
        Ok(())
    }

    pub async fn start_strategy(&self, name: &str) -> Result<(), EngineError> {
        let mut runners = self.runners.write().await;
        let running = runners.values().filter(|r| r.is_running()).count();
        let runner = runner_mut(&mut runners, name)?;
        if !runner.is_running() && running >= self.config.max_concurrent {
            return Err(EngineError::TooManyRunning {
                running,
                max: self.config.max_concurrent,
            });
        }
        runner.start().await?;
        Ok(())
    }

    pub async fn stop_strategy(&self, name: &str) -> Result<(), EngineError> {
        let mut runners = self.runners.write().await;
        runner_mut(&mut runners, name)?.stop().await?;
        Ok(())
    }

    pub async fn pause_strategy(&self, name: &str) -> Result<(), EngineError> {
        let mut runners = self.runners.write().await;
        runner_mut(&mut runners, name)?.pause().await?;
        Ok(())
    }

    pub async fn resume_strategy(&self, name: &str) -> Result<(), EngineError> {
        let mut runners = self.runners.write().await;
        runner_mut(&mut runners, name)?.resume().await?;
        Ok(())
    }

    /// Stop every strategy, closing open positions
    pub async fn emergency_stop(&self) {
        warn!("Emergency stop: stopping all strategies");
        let mut runners = self.runners.write().await;
        for (name, runner) in runners.iter_mut() {
            if let Err(e) = runner.stop().await {
                error!(strategy = %name, error = %e, "Failed to stop strategy");
            }
        }
        self.ctx
            .notifier
            .notify_error("Emergency stop: all strategies stopped")
            .await;
    }

    /// Snapshot for `symbol`, refetched when the cached copy is older than the TTL
    pub async fn market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        let ttl = Duration::from_secs(self.config.market_data_ttl_secs);
        let mut cache = self.cache.lock().await;
        let fresh = cache
            .get(symbol)
            .is_some_and(|entry| entry.fetched_at.elapsed() < ttl);
        if !fresh {
            let ticker = self.feed.ticker(symbol).await?;
            let klines = self
                .feed
                .klines(symbol, &self.config.kline_interval, self.config.kline_limit)
                .await?;
            debug!(%symbol, klines = klines.len(), "Market data refreshed");
            cache.insert(
                symbol.to_string(),
                CachedMarket {
                    ticker,
                    klines,
                    fetched_at: Instant::now(),
                },
            );
        }

        let entry = cache
            .get(symbol)
            .ok_or_else(|| anyhow::anyhow!("no market data for {}", symbol))?;
        let mut snapshot =
            MarketSnapshot::new(symbol, entry.ticker.last_price, entry.klines.clone());
        snapshot.ticker = Some(entry.ticker.clone());
        Ok(snapshot)
    }

    /// Run one update for every running strategy
    pub async fn update_all(&self) -> Vec<(String, UpdateOutcome)> {
        let started = Instant::now();
        let mut outcomes = Vec::new();
        let mut runners = self.runners.write().await;

        for (name, runner) in runners.iter_mut() {
            if !runner.is_running() {
                continue;
            }
            let snapshot = match self.market_snapshot(runner.symbol()).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(strategy = %name, symbol = %runner.symbol(), error = %e, "Market data unavailable");
                    continue;
                }
            };
            let outcome = runner.update(&snapshot).await;
            if !matches!(outcome, UpdateOutcome::NoAction) {
                debug!(strategy = %name, ?outcome, "Strategy updated");
            }
            outcomes.push((name.clone(), outcome));
        }

        let running = runners.values().filter(|r| r.is_running()).count();
        let open = runners.values().filter(|r| r.position().is_some()).count();
        drop(runners);

        telemetry::set_gauge(GaugeMetric::RunningStrategies, running as f64);
        telemetry::set_gauge(GaugeMetric::OpenPositions, open as f64);
        let assessment = self.ctx.risk.lock().await.assessment(Utc::now());
        telemetry::set_gauge(GaugeMetric::RiskScore, assessment.risk_score);
        telemetry::set_gauge(GaugeMetric::DailyPnl, assessment.daily_pnl);
        telemetry::record_latency(LatencyMetric::EngineCycle, started.elapsed());
        outcomes
    }

    /// Names of running strategies not updated within the stale window
    pub async fn stale_strategies(&self) -> Vec<String> {
        let stale_after = chrono::Duration::seconds(self.config.stale_after_secs as i64);
        let now = Utc::now();
        self.runners
            .read()
            .await
            .values()
            .filter(|r| r.is_running())
            .filter(|r| match r.stats().last_update.or(r.stats().started_at) {
                Some(t) => now - t > stale_after,
                None => true,
            })
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Write a performance snapshot per strategy
    pub async fn save_performance_metrics(&self) {
        match self.ctx.execution.balance().await {
            Ok(balance) => {
                telemetry::set_gauge(GaugeMetric::Equity, balance.total.to_f64().unwrap_or_default())
            }
            Err(e) => debug!(error = %e, "Balance unavailable"),
        }
        let Some(db) = &self.ctx.db else {
            return;
        };
        let now = Utc::now();
        let max_drawdown = self.ctx.risk.lock().await.assessment(now).max_drawdown;
        let runners = self.runners.read().await;
        for runner in runners.values() {
            let stats = runner.stats();
            let snapshot = PerformanceSnapshot {
                strategy_name: Some(runner.name().to_string()),
                symbol: Some(runner.symbol().to_string()),
                period_start: stats.started_at.unwrap_or(now),
                period_end: now,
                total_trades: stats.total_trades,
                winning_trades: stats.winning_trades,
                total_profit_loss: stats.total_pnl.to_f64().unwrap_or_default(),
                max_drawdown,
                win_rate: stats.win_rate(),
                avg_profit: None,
                avg_loss: None,
                sharpe_ratio: None,
            };
            if let Err(e) = db.save_performance_metrics(&snapshot).await {
                warn!(strategy = %runner.name(), error = %e, "Failed to save performance metrics");
            }
        }
    }

    /// Drive the update loop until `shutdown` flips to true or Ctrl-C
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        *self.started_at.write().await = Some(Utc::now());
        let mut ticker = time::interval(Duration::from_secs(self.config.update_interval_secs.max(1)));
        let metrics_every = Duration::from_secs(self.config.metrics_save_interval_secs);
        let mut last_metrics = Instant::now();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!(
            interval_secs = self.config.update_interval_secs,
            max_concurrent = self.config.max_concurrent,
            "Strategy engine started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.update_all().await;

                    for name in self.stale_strategies().await {
                        warn!(strategy = %name, stale_after_secs = self.config.stale_after_secs, "Strategy has not updated recently");
                    }
                    if last_metrics.elapsed() >= metrics_every {
                        self.save_performance_metrics().await;
                        last_metrics = Instant::now();
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested");
                        break;
                    }
                }
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received");
                    break;
                }
            }
        }

        let mut runners = self.runners.write().await;
        for (name, runner) in runners.iter_mut() {
            if let Err(e) = runner.stop().await {
                error!(strategy = %name, error = %e, "Failed to stop strategy");
            }
        }
        drop(runners);
        self.save_performance_metrics().await;
        *self.started_at.write().await = None;
        info!("Strategy engine stopped");
    }

    pub async fn status(&self) -> EngineStatus {
        let runners = self.runners.read().await;
        EngineStatus {
            running: runners.values().filter(|r| r.is_running()).count(),
            total: runners.len(),
            max_concurrent: self.config.max_concurrent,
            uptime_secs: self
                .started_at
                .read()
                .await
                .map(|t| (Utc::now() - t).num_seconds()),
            cache_size: self.cache.lock().await.len(),
        }
    }

    /// Per-strategy status, sorted by name
    pub async fn strategies_status(&self) -> Vec<RunnerStatus> {
        let mut statuses: Vec<_> = self
            .runners
            .read()
            .await
            .values()
            .map(StrategyRunner::status)
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}
