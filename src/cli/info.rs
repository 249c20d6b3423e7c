//! Read-only commands: strategies, risk, status, config

use chrono::Utc;

use super::App;
use crate::risk::RiskManager;
use crate::strategy::StrategyKind;

pub fn strategies() -> anyhow::Result<()> {
    println!("Available strategies:");
    for kind in StrategyKind::ALL {
        let meta = kind.metadata();
        println!();
        println!("  {} ({})", meta.display_name, kind);
        println!("    {}", meta.description);
        println!("    Risk level:       {}", meta.risk_level);
        println!("    Timeframe:        {}", meta.timeframe);
        println!("    Suitable for:     {}", meta.suitable_for.join(", "));
        println!("    Not suitable for: {}", meta.not_suitable_for.join(", "));
    }
    Ok(())
}

pub fn risk(app: &App) -> anyhow::Result<()> {
    let limits = &app.config.risk;
    println!("Risk limits:");
    println!("  Max daily loss:          {}%", limits.max_daily_loss_pct);
    println!("  Max consecutive losses:  {}", limits.max_consecutive_losses);
    println!("  Max stop loss:           {}%", limits.max_stop_loss_pct);
    println!("  Max position size:       {}%", limits.max_position_size_pct);
    println!("  Max trades per day:      {}", limits.max_trades_per_day);
    println!("  Max drawdown:            {}%", limits.max_drawdown_pct);
    println!("  Min signal confidence:   {}", limits.min_confidence_threshold);
    println!();

    let mut manager = RiskManager::new(limits.clone());
    println!("{}", manager.detailed_report(Utc::now()));
    Ok(())
}

pub async fn status(app: &App) -> anyhow::Result<()> {
    let config = &app.config;
    println!("bybit-bot status");
    println!("  Environment: {}", app.environment());
    println!("  Execution:   {:?}", config.execution.mode);
    println!("  Config:      {}", app.config_source);
    println!("  Database:    {}", config.database_path().display());

    let client = app.client(None)?;
    println!("  API keys:    {}", if client.has_credentials() { "configured" } else { "missing" });
    let rate = client.rate_limit_status().await;
    println!(
        "  Rate limit:  {}/{} requests used per {}s ({} remaining)",
        rate.requests_made, rate.max_requests, rate.window_secs, rate.remaining
    );
    println!(
        "  Telegram:    {}",
        if app.notifier().is_enabled() { "enabled" } else { "disabled" }
    );

    println!("  Strategies:");
    if config.strategies.is_empty() {
        println!("    (none configured)");
    }
    for s in &config.strategies {
        println!(
            "    {:<20} {:<18} {:<10} size {} auto_start {}",
            s.name, s.kind, s.symbol, s.position_size, s.auto_start
        );
    }
    Ok(())
}

pub fn config(app: &App) -> anyhow::Result<()> {
    let config = &app.config;
    println!("Configuration ({})", app.config_source);
    println!("  Exchange:   {} (recv_window {}ms, timeout {}s, {} req/{}s, cache {}s)",
        app.environment(),
        config.exchange.recv_window_ms,
        config.exchange.timeout_secs,
        config.exchange.max_requests,
        config.exchange.rate_window_secs,
        config.exchange.cache_ttl_secs,
    );
    println!("  Keys file:  {}", config.credentials.keys_file.display());
    println!(
        "  Engine:     max {} concurrent, update every {}s, klines {} x {}",
        config.engine.max_concurrent,
        config.engine.update_interval_secs,
        config.engine.kline_limit,
        config.engine.kline_interval
    );
    println!(
        "  Execution:  {:?} (fee {}, initial balance {})",
        config.execution.mode, config.execution.fee_rate, config.execution.initial_balance
    );
    println!(
        "  Database:   {} (retention {} days, backup on start {})",
        config.database_path().display(),
        config.database.retention_days,
        config.database.backup_on_start
    );
    println!(
        "  Risk:       daily loss {}%, drawdown {}%, {} trades/day",
        config.risk.max_daily_loss_pct, config.risk.max_drawdown_pct, config.risk.max_trades_per_day
    );
    println!(
        "  Telegram:   enabled {}, trades {}, errors {}",
        config.telegram.enabled, config.telegram.trade_notifications, config.telegram.error_notifications
    );
    println!(
        "  Capture:    {} -> {} every {}",
        config.data.symbols.join(","),
        config.data.output_dir.display(),
        config.data.rotation_interval
    );
    println!(
        "  Telemetry:  level {}, format {:?}, metrics port {}",
        config.telemetry.log_level, config.telemetry.log_format, config.telemetry.metrics_port
    );
    println!("  Strategies: {}", config.strategies.len());
    for s in &config.strategies {
        println!(
            "    {} [{}] {} {} sl {}% tp {}% params {}",
            s.name, s.kind, s.symbol, s.timeframe, s.stop_loss_pct, s.take_profit_pct, s.params
        );
    }

    let problems = config.validate(&app.credentials);
    if problems.is_empty() {
        println!("Configuration is valid");
    } else {
        println!("Problems:");
        for problem in problems {
            println!("  - {}", problem);
        }
    }
    Ok(())
}
