//! Trade journal commands

use clap::Subcommand;
use std::path::PathBuf;

use super::App;
use crate::config::expand_home;
use crate::db::Database;

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Performance summary over journaled trades
    Summary {
        #[arg(short, long)]
        strategy: Option<String>,
        #[arg(short, long, default_value = "30")]
        days: u32,
    },
    /// Recent trades, newest first
    Trades {
        #[arg(short, long, default_value = "7")]
        days: u32,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Recent strategy events
    Logs {
        #[arg(short, long)]
        strategy: Option<String>,
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },
    /// Write a copy of the database
    Backup {
        /// Target directory (defaults to `<database.dir>/backups`)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Delete journal rows older than the retention period
    Cleanup {
        /// Retention in days (defaults to `database.retention_days`)
        #[arg(short, long)]
        days: Option<u32>,
    },
}

impl DbCommand {
    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        let db = app.database().await?;
        let result = self.run(app, &db).await;
        db.close().await;
        result
    }

    async fn run(&self, app: &App, db: &Database) -> anyhow::Result<()> {
        match self {
            DbCommand::Summary { strategy, days } => {
                let summary = db.performance_summary(strategy.as_deref(), *days).await?;
                println!(
                    "Performance over {} days{}",
                    days,
                    strategy.as_ref().map(|s| format!(" ({})", s)).unwrap_or_default()
                );
                println!("  Trades:   {}", summary.total_trades);
                println!("  Winning:  {}", summary.winning_trades);
                println!("  Losing:   {}", summary.losing_trades);
                println!("  Win rate: {:.2}%", summary.win_rate);
                println!("  PnL:      {:.4}", summary.total_pnl);
            }
            DbCommand::Trades {
                days,
                symbol,
                strategy,
            } => {
                let trades = db
                    .trade_history(*days, symbol.as_deref(), strategy.as_deref())
                    .await?;
                if trades.is_empty() {
                    println!("No trades in the last {} days", days);
                }
                for t in trades {
                    println!(
                        "{} {:<12} {:<4} {:>12} @ {:<12} {:<10} {:<16} pnl {}",
                        t.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        t.symbol,
                        t.side,
                        t.quantity,
                        t.executed_price.or(t.price).map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                        t.status,
                        t.strategy_name.as_deref().unwrap_or("-"),
                        t.profit_loss.map(|p| format!("{:.4}", p)).unwrap_or_else(|| "-".into()),
                    );
                }
            }
            DbCommand::Logs { strategy, limit } => {
                for log in db.strategy_logs(strategy.as_deref(), *limit).await? {
                    println!(
                        "{} [{}] {} {} {}",
                        log.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        log.strategy_name,
                        log.action,
                        log.symbol.as_deref().unwrap_or(""),
                        log.message.or(log.details).unwrap_or_default(),
                    );
                }
            }
            DbCommand::Backup { dir } => {
                let dir = dir
                    .clone()
                    .unwrap_or_else(|| expand_home(&app.config.database.dir).join("backups"));
                let path = db.backup(&dir).await?;
                println!("Backup written to {}", path.display());
            }
            DbCommand::Cleanup { days } => {
                let days = days.unwrap_or(app.config.database.retention_days);
                let report = db.cleanup_old_data(days).await?;
                println!("Removed {} rows older than {} days", report.total(), days);
                println!("  log_entries:   {}", report.log_entries);
                println!("  strategy_logs: {}", report.strategy_logs);
                println!("  api_requests:  {}", report.api_requests);
                println!("  risk_events:   {}", report.risk_events);
                println!("  market_data:   {}", report.market_data);
            }
        }
        Ok(())
    }
}
