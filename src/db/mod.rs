//! SQLite trading journal
//!
//! One database file per environment (`trading_bot_testnet.db`,
//! `trading_bot_mainnet.db`). Every row carries a unix-millisecond timestamp;
//! the schema lives in `migrations/`.

mod records;

pub use records::{
    CachedTicker, CleanupReport, NewLogEntry, NewStrategyLog, NewTrade, PerformanceSnapshot,
    PerformanceSummary, StrategyAction, StrategyLogRecord, TradeRecord,
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use records::{from_millis, to_millis, StrategyLogRow, TickerRow, TradeRow};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bybit::{ApiRequestRecord, Kline, RequestJournal, Ticker};
use crate::risk::RiskEvent;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default age after which a cached ticker is considered outdated
pub fn ticker_max_age() -> Duration {
    Duration::minutes(30)
}

fn f(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Risk bucket for a ticker by the size of its 24 h move
pub fn ticker_risk_level(change_24h_pct: f64) -> &'static str {
    let change = change_24h_pct.abs();
    if change > 10.0 {
        "high"
    } else if change > 5.0 {
        "medium"
    } else {
        "low"
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    environment: String,
    session_id: Uuid,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if missing) the database at `path` and apply migrations
    #[instrument(fields(db_path = %path.display()))]
    pub async fn open(path: &Path, environment: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let db = Self::with_pool(pool, environment, Some(path.to_path_buf())).await?;
        info!(environment, "Database ready");
        Ok(db)
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory(environment: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool, environment, None).await
    }

    async fn with_pool(pool: SqlitePool, environment: &str, path: Option<PathBuf>) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            environment: environment.to_string(),
            session_id: Uuid::new_v4(),
            path,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn log_entry(&self, entry: NewLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO log_entries (timestamp, level, logger_name, module, message, exception, session_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(to_millis(Utc::now()))
        .bind(&entry.level)
        .bind(&entry.logger_name)
        .bind(&entry.module)
        .bind(&entry.message)
        .bind(&entry.exception)
        .bind(self.session_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Journal a trade. A repeated `order_id` replaces the earlier row.
    pub async fn record_trade(&self, trade: &NewTrade) -> Result<()> {
        let additional = trade
            .additional_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO trade_entries (timestamp, order_id, symbol, side, order_type, quantity, price,
                executed_price, executed_quantity, status, strategy_name, profit_loss, commission,
                environment, additional_data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(order_id) DO UPDATE SET
                status = excluded.status,
                executed_price = excluded.executed_price,
                executed_quantity = excluded.executed_quantity,
                profit_loss = excluded.profit_loss,
                commission = excluded.commission
            "#,
        )
        .bind(to_millis(Utc::now()))
        .bind(&trade.order_id)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.order_type.as_str())
        .bind(f(trade.quantity))
        .bind(trade.price.map(f))
        .bind(trade.executed_price.map(f))
        .bind(trade.executed_quantity.map(f))
        .bind(&trade.status)
        .bind(&trade.strategy_name)
        .bind(trade.profit_loss.map(f))
        .bind(trade.commission.map(f))
        .bind(&self.environment)
        .bind(additional)
        .execute(&self.pool)
        .await?;

        debug!(order_id = %trade.order_id, symbol = %trade.symbol, "Trade journaled");
        Ok(())
    }

    /// Returns false when no trade has that order ID
    pub async fn update_trade_status(
        &self,
        order_id: &str,
        status: &str,
        executed_price: Option<Decimal>,
        profit_loss: Option<Decimal>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE trade_entries
            SET status = ?,
                executed_price = COALESCE(?, executed_price),
                profit_loss = COALESCE(?, profit_loss)
            WHERE order_id = ?
            "#,
        )
        .bind(status)
        .bind(executed_price.map(f))
        .bind(profit_loss.map(f))
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn log_strategy_event(&self, event: NewStrategyLog) -> Result<()> {
        let data = event.data.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO strategy_logs (timestamp, strategy_name, symbol, action, details, message, data, session_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(to_millis(Utc::now()))
        .bind(&event.strategy_name)
        .bind(&event.symbol)
        .bind(event.action.as_str())
        .bind(&event.details)
        .bind(&event.message)
        .bind(data)
        .bind(self.session_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store candles, skipping ones already present. Returns rows inserted.
    pub async fn save_klines(&self, symbol: &str, timeframe: &str, klines: &[Kline]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for kline in klines {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO market_data (timestamp, symbol, timeframe, open_price, high_price,
                    low_price, close_price, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(to_millis(kline.start))
            .bind(symbol)
            .bind(timeframe)
            .bind(f(kline.open))
            .bind(f(kline.high))
            .bind(f(kline.low))
            .bind(f(kline.close))
            .bind(f(kline.volume))
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn log_risk_event(&self, event: &RiskEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO risk_events (timestamp, event_type, symbol, strategy_name, trigger_value,
                current_value, action_taken, description, severity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(to_millis(event.timestamp))
        .bind(event.event_type)
        .bind(&event.symbol)
        .bind(&event.strategy_name)
        .bind(event.trigger_value)
        .bind(event.current_value)
        .bind(event.action_taken)
        .bind(&event.description)
        .bind(event.severity.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_api_request(&self, record: &ApiRequestRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_requests (timestamp, endpoint, method, params, response_code, success,
                error_message, response_time, session_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(to_millis(Utc::now()))
        .bind(&record.endpoint)
        .bind(record.method.to_uppercase())
        .bind(&record.params)
        .bind(record.response_code)
        .bind(record.success)
        .bind(&record.error)
        .bind(record.elapsed_ms as f64)
        .bind(self.session_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_ticker(&self, ticker: &Ticker) -> Result<()> {
        self.upsert_tickers(std::slice::from_ref(ticker)).await
    }

    /// Insert or refresh tickers, one row per symbol
    pub async fn upsert_tickers(&self, tickers: &[Ticker]) -> Result<()> {
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;
        for ticker in tickers {
            let change_pct = f(ticker.price_24h_pcnt) * 100.0;
            sqlx::query(
                r#"
                INSERT INTO ticker_data (symbol, price, change_24h, volume_24h, high_24h, low_24h,
                    category, risk_level, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, 'spot', ?, ?)
                ON CONFLICT(symbol) DO UPDATE SET
                    price = excluded.price,
                    change_24h = excluded.change_24h,
                    volume_24h = excluded.volume_24h,
                    high_24h = excluded.high_24h,
                    low_24h = excluded.low_24h,
                    risk_level = excluded.risk_level,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(&ticker.symbol)
            .bind(f(ticker.last_price))
            .bind(change_pct)
            .bind(f(ticker.volume_24h))
            .bind(f(ticker.high_price_24h))
            .bind(f(ticker.low_price_24h))
            .bind(ticker_risk_level(change_pct))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(count = tickers.len(), "Tickers cached");
        Ok(())
    }

    /// Tickers refreshed within `max_age`, newest first
    pub async fn cached_tickers(&self, max_age: Duration) -> Result<Vec<CachedTicker>> {
        let cutoff = to_millis(Utc::now() - max_age);
        let rows = sqlx::query_as::<_, TickerRow>(
            r#"
            SELECT symbol, price, change_24h, volume_24h, high_24h, low_24h, risk_level, last_updated
            FROM ticker_data
            WHERE last_updated >= ?
            ORDER BY last_updated DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CachedTicker::from).collect())
    }

    /// Symbols whose cached ticker is older than `max_age`
    pub async fn outdated_tickers(&self, max_age: Duration) -> Result<Vec<String>> {
        let cutoff = to_millis(Utc::now() - max_age);
        let symbols = sqlx::query_scalar::<_, String>(
            "SELECT symbol FROM ticker_data WHERE last_updated < ? ORDER BY symbol",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(symbols)
    }

    pub async fn save_performance_metrics(&self, snapshot: &PerformanceSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO performance_metrics (timestamp, strategy_name, symbol, period_start, period_end,
                total_trades, winning_trades, losing_trades, total_profit_loss, max_drawdown,
                sharpe_ratio, win_rate, avg_profit, avg_loss)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(to_millis(Utc::now()))
        .bind(&snapshot.strategy_name)
        .bind(&snapshot.symbol)
        .bind(to_millis(snapshot.period_start))
        .bind(to_millis(snapshot.period_end))
        .bind(snapshot.total_trades as i64)
        .bind(snapshot.winning_trades as i64)
        .bind(snapshot.total_trades.saturating_sub(snapshot.winning_trades) as i64)
        .bind(snapshot.total_profit_loss)
        .bind(snapshot.max_drawdown)
        .bind(snapshot.sharpe_ratio)
        .bind(snapshot.win_rate)
        .bind(snapshot.avg_profit)
        .bind(snapshot.avg_loss)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Latest strategy events, newest first
    pub async fn strategy_logs(
        &self,
        strategy: Option<&str>,
        limit: u32,
    ) -> Result<Vec<StrategyLogRecord>> {
        let rows = sqlx::query_as::<_, StrategyLogRow>(
            r#"
            SELECT timestamp, strategy_name, symbol, action, details, message, data, session_id
            FROM strategy_logs
            WHERE (?1 IS NULL OR strategy_name = ?1)
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(strategy)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StrategyLogRecord::from).collect())
    }

    /// Trades from the last `days` days, newest first
    pub async fn trade_history(
        &self,
        days: u32,
        symbol: Option<&str>,
        strategy: Option<&str>,
    ) -> Result<Vec<TradeRecord>> {
        let since = to_millis(Utc::now() - Duration::days(days as i64));
        let rows = sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT timestamp, order_id, symbol, side, order_type, quantity, price, executed_price,
                status, strategy_name, profit_loss, environment
            FROM trade_entries
            WHERE timestamp >= ?1
              AND (?2 IS NULL OR symbol = ?2)
              AND (?3 IS NULL OR strategy_name = ?3)
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(since)
        .bind(symbol)
        .bind(strategy)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TradeRecord::from).collect())
    }

    pub async fn performance_summary(
        &self,
        strategy: Option<&str>,
        days: u32,
    ) -> Result<PerformanceSummary> {
        let since = to_millis(Utc::now() - Duration::days(days as i64));
        let (total, wins, losses, pnl): (i64, Option<i64>, Option<i64>, Option<f64>) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*),
                       SUM(CASE WHEN profit_loss > 0 THEN 1 ELSE 0 END),
                       SUM(CASE WHEN profit_loss < 0 THEN 1 ELSE 0 END),
                       SUM(profit_loss)
                FROM trade_entries
                WHERE timestamp >= ?1 AND (?2 IS NULL OR strategy_name = ?2)
                "#,
            )
            .bind(since)
            .bind(strategy)
            .fetch_one(&self.pool)
            .await?;

        if total == 0 {
            return Ok(PerformanceSummary::default());
        }
        let wins = wins.unwrap_or(0);
        Ok(PerformanceSummary {
            total_trades: total as u32,
            winning_trades: wins as u32,
            losing_trades: losses.unwrap_or(0) as u32,
            win_rate: round_to(wins as f64 / total as f64 * 100.0, 2),
            total_pnl: round_to(pnl.unwrap_or(0.0), 4),
        })
    }

    /// Delete rows older than `days`. Daily candles are kept.
    pub async fn cleanup_old_data(&self, days: u32) -> Result<CleanupReport> {
        let cutoff = to_millis(Utc::now() - Duration::days(days as i64));
        let mut tx = self.pool.begin().await?;

        let delete = |table: &str| format!("DELETE FROM {} WHERE timestamp < ?", table);
        let log_entries = sqlx::query(&delete("log_entries"))
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let strategy_logs = sqlx::query(&delete("strategy_logs"))
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let api_requests = sqlx::query(&delete("api_requests"))
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let risk_events = sqlx::query(&delete("risk_events"))
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let market_data =
            sqlx::query("DELETE FROM market_data WHERE timestamp < ? AND timeframe != '1d'")
                .bind(cutoff)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        tx.commit().await?;

        let report = CleanupReport {
            log_entries,
            strategy_logs,
            api_requests,
            risk_events,
            market_data,
        };
        info!(removed = report.total(), days, "Old journal data removed");
        Ok(report)
    }

    /// Write a consistent copy of the database into `dir`
    pub async fn backup(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let file = format!(
            "trading_bot_backup_{}.db",
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let target = dir.join(file);
        sqlx::query("VACUUM INTO ?")
            .bind(target.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await?;
        info!(path = %target.display(), "Database backup written");
        Ok(target)
    }

    /// Oldest and newest trade timestamps, if any trades exist
    pub async fn trade_span(&self) -> Result<Option<(chrono::DateTime<Utc>, chrono::DateTime<Utc>)>> {
        let (min, max): (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(timestamp), MAX(timestamp) FROM trade_entries")
                .fetch_one(&self.pool)
                .await?;
        Ok(min.zip(max).map(|(a, b)| (from_millis(a), from_millis(b))))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RequestJournal for Database {
    async fn record_request(&self, record: ApiRequestRecord) {
        if let Err(e) = self.log_api_request(&record).await {
            warn!(error = %e, endpoint = %record.endpoint, "Failed to journal API request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bybit::Side;
    use crate::risk::{RiskLevel, RiskManager, RiskLimits};
    use rust_decimal_macros::dec;

    async fn db() -> Database {
        Database::in_memory("testnet").await.unwrap()
    }

    fn ticker(symbol: &str, price: Decimal, change: Decimal) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            last_price: price,
            bid_price: price,
            bid_size: dec!(1),
            ask_price: price,
            ask_size: dec!(1),
            prev_price_24h: price,
            price_24h_pcnt: change,
            high_price_24h: price,
            low_price_24h: price,
            turnover_24h: dec!(1000000),
            volume_24h: dec!(100),
        }
    }

    #[tokio::test]
    async fn test_trade_journal_and_summary() {
        let db = db().await;
        let open = NewTrade::market("o1", "BTCUSDT", Side::Buy, dec!(0.01), dec!(30000))
            .for_strategy("ma");
        db.record_trade(&open).await.unwrap();
        let close = NewTrade::market("o2", "BTCUSDT", Side::Sell, dec!(0.01), dec!(31000))
            .for_strategy("ma")
            .with_pnl(dec!(10.123456));
        db.record_trade(&close).await.unwrap();
        let loss = NewTrade::market("o3", "ETHUSDT", Side::Sell, dec!(1), dec!(2000))
            .for_strategy("grid")
            .with_pnl(dec!(-4));
        db.record_trade(&loss).await.unwrap();

        let history = db.trade_history(30, None, None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].order_id.as_deref(), Some("o3"));
        assert_eq!(history[0].environment, "testnet");

        let ma_only = db.trade_history(30, None, Some("ma")).await.unwrap();
        assert_eq!(ma_only.len(), 2);
        let eth = db.trade_history(30, Some("ETHUSDT"), None).await.unwrap();
        assert_eq!(eth.len(), 1);

        let summary = db.performance_summary(None, 30).await.unwrap();
        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.winning_trades, 1);
        assert_eq!(summary.losing_trades, 1);
        assert_eq!(summary.win_rate, 33.33);
        assert_eq!(summary.total_pnl, 6.1235);

        let empty = db.performance_summary(Some("nobody"), 30).await.unwrap();
        assert_eq!(empty, PerformanceSummary::default());
    }

    #[tokio::test]
    async fn test_duplicate_order_id_updates_row() {
        let db = db().await;
        let trade = NewTrade::market("dup", "BTCUSDT", Side::Buy, dec!(1), dec!(100));
        db.record_trade(&trade).await.unwrap();
        db.record_trade(&trade.clone().with_pnl(dec!(5))).await.unwrap();

        let history = db.trade_history(1, None, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].profit_loss, Some(5.0));

        assert!(db
            .update_trade_status("dup", "Cancelled", None, None)
            .await
            .unwrap());
        assert!(!db
            .update_trade_status("missing", "Cancelled", None, None)
            .await
            .unwrap());
        let history = db.trade_history(1, None, None).await.unwrap();
        assert_eq!(history[0].status, "Cancelled");
        assert_eq!(history[0].profit_loss, Some(5.0));
    }

    #[tokio::test]
    async fn test_strategy_logs_filter_and_limit() {
        let db = db().await;
        for i in 0..5 {
            db.log_strategy_event(
                NewStrategyLog::new("momentum", StrategyAction::SignalGenerated)
                    .symbol("BTCUSDT")
                    .message(format!("signal {}", i))
                    .data(serde_json::json!({ "confidence": 0.8 })),
            )
            .await
            .unwrap();
        }
        db.log_strategy_event(NewStrategyLog::new("grid", StrategyAction::StrategyStarted))
            .await
            .unwrap();

        let logs = db.strategy_logs(Some("momentum"), 3).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message.as_deref(), Some("signal 4"));
        assert_eq!(logs[0].action, "SIGNAL_GENERATED");
        assert_eq!(logs[0].data.as_ref().unwrap()["confidence"], 0.8);
        assert_eq!(
            logs[0].session_id.as_deref(),
            Some(db.session_id().to_string().as_str())
        );

        assert_eq!(db.strategy_logs(None, 100).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_ticker_upsert_and_age() {
        let db = db().await;
        db.upsert_tickers(&[
            ticker("BTCUSDT", dec!(30000), dec!(0.02)),
            ticker("DOGEUSDT", dec!(0.1), dec!(-0.15)),
        ])
        .await
        .unwrap();
        db.upsert_ticker(&ticker("BTCUSDT", dec!(31000), dec!(0.07)))
            .await
            .unwrap();

        let cached = db.cached_tickers(ticker_max_age()).await.unwrap();
        assert_eq!(cached.len(), 2);
        let btc = cached.iter().find(|t| t.symbol == "BTCUSDT").unwrap();
        assert_eq!(btc.price, 31000.0);
        assert_eq!(btc.risk_level, "medium");
        let doge = cached.iter().find(|t| t.symbol == "DOGEUSDT").unwrap();
        assert_eq!(doge.risk_level, "high");

        assert!(db.outdated_tickers(ticker_max_age()).await.unwrap().is_empty());
        let stale = db.outdated_tickers(Duration::milliseconds(-1000)).await.unwrap();
        assert_eq!(stale, vec!["BTCUSDT", "DOGEUSDT"]);
    }

    #[tokio::test]
    async fn test_klines_deduplicated_and_cleanup_keeps_daily() {
        let db = db().await;
        let old = Utc::now() - Duration::days(200);
        let kline = Kline {
            start: old,
            open: dec!(1),
            high: dec!(2),
            low: dec!(0.5),
            close: dec!(1.5),
            volume: dec!(10),
            turnover: dec!(15),
        };
        assert_eq!(db.save_klines("BTCUSDT", "1h", &[kline.clone()]).await.unwrap(), 1);
        assert_eq!(db.save_klines("BTCUSDT", "1h", &[kline.clone()]).await.unwrap(), 0);
        assert_eq!(db.save_klines("BTCUSDT", "1d", &[kline]).await.unwrap(), 1);

        db.log_entry(NewLogEntry::new("error", "engine", "boom").with_exception("trace"))
            .await
            .unwrap();

        let report = db.cleanup_old_data(90).await.unwrap();
        assert_eq!(report.market_data, 1);
        assert_eq!(report.log_entries, 0);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM market_data")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_risk_events_and_api_journal() {
        let db = db().await;
        let mut rm = RiskManager::new(RiskLimits::default());
        let _ = rm.check_trade_allowed(0.1, 5.0, 2.0, Utc::now());
        for event in rm.drain_events() {
            db.log_risk_event(&event).await.unwrap();
        }
        let (event_type, severity): (String, String) =
            sqlx::query_as("SELECT event_type, severity FROM risk_events")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(event_type, "low_confidence_signal");
        assert_eq!(severity, RiskLevel::Medium.as_str());

        db.record_request(ApiRequestRecord {
            endpoint: "/v5/market/time".to_string(),
            method: "get".to_string(),
            params: String::new(),
            response_code: 0,
            success: true,
            error: None,
            elapsed_ms: 12,
        })
        .await;
        let method: String = sqlx::query_scalar("SELECT method FROM api_requests")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(method, "GET");
    }

    #[tokio::test]
    async fn test_performance_snapshot_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trading_bot_testnet.db");
        let db = Database::open(&path, "testnet").await.unwrap();
        let now = Utc::now();
        db.save_performance_metrics(&PerformanceSnapshot {
            strategy_name: Some("ma".to_string()),
            symbol: Some("BTCUSDT".to_string()),
            period_start: now - Duration::hours(1),
            period_end: now,
            total_trades: 4,
            winning_trades: 3,
            total_profit_loss: 12.5,
            max_drawdown: 1.0,
            win_rate: 75.0,
            avg_profit: None,
            avg_loss: None,
            sharpe_ratio: None,
        })
        .await
        .unwrap();

        let backup = db.backup(&dir.path().join("backups")).await.unwrap();
        assert!(backup.exists());
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("trading_bot_backup_"));
        assert!(name.ends_with(".db"));

        let copy = Database::open(&backup, "testnet").await.unwrap();
        let losing: i64 = sqlx::query_scalar("SELECT losing_trades FROM performance_metrics")
            .fetch_one(copy.pool())
            .await
            .unwrap();
        assert_eq!(losing, 1);
    }
}
