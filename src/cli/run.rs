//! Run command implementation

use clap::Args;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use super::App;
use crate::config::{expand_home, ExecutionMode, StrategyConfig};
use crate::data::{self, DataRecorder, RecorderConfig};
use crate::execution::{ExecutionEngine, LiveEngine, PaperEngine};
use crate::risk::RiskManager;
use crate::strategy::{RunnerContext, StrategyEngine};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Start only these strategies (repeatable); defaults to every `auto_start` entry
    #[arg(short, long)]
    pub strategy: Vec<String>,

    /// Force paper execution even when the configuration says live
    #[arg(long)]
    pub paper: bool,
}

impl RunArgs {
    /// Whether `config` should be started for this invocation
    pub fn selects(&self, config: &StrategyConfig) -> bool {
        if self.strategy.is_empty() {
            config.auto_start
        } else {
            self.strategy.iter().any(|name| name == &config.name)
        }
    }

    pub fn execution_mode(&self, configured: ExecutionMode) -> ExecutionMode {
        if self.paper {
            ExecutionMode::Paper
        } else {
            configured
        }
    }

    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        let config = &app.config;
        for name in &self.strategy {
            if !config.strategies.iter().any(|s| &s.name == name) {
                anyhow::bail!("strategy '{}' is not configured", name);
            }
        }

        let db = app.database().await?;
        if config.database.backup_on_start {
            let dir = expand_home(&config.database.dir).join("backups");
            if let Err(e) = db.backup(&dir).await {
                tracing::warn!(error = %e, "Database backup failed");
            }
        }

        let client = Arc::new(app.client(Some(&db))?);
        let mode = self.execution_mode(config.execution.mode);
        let execution: Arc<dyn ExecutionEngine> = match mode {
            ExecutionMode::Paper => Arc::new(PaperEngine::new(
                config.execution.fee_rate,
                config.execution.initial_balance,
            )),
            ExecutionMode::Live => {
                if !client.has_credentials() {
                    anyhow::bail!(
                        "live execution needs Bybit API keys for {}",
                        app.environment()
                    );
                }
                Arc::new(LiveEngine::new(client.clone()))
            }
        };

        let notifier = Arc::new(app.notifier());
        let ctx = RunnerContext {
            execution,
            risk: Arc::new(Mutex::new(RiskManager::new(config.risk.clone()))),
            db: Some(db.clone()),
            notifier: notifier.clone(),
        };
        let engine = StrategyEngine::new(client, ctx, config.engine.clone());

        let mut started = Vec::new();
        for strategy in &config.strategies {
            engine.register(strategy.clone()).await?;
            if !self.selects(strategy) {
                continue;
            }
            match engine.start_strategy(&strategy.name).await {
                Ok(()) => started.push(strategy.name.clone()),
                Err(e) => tracing::error!(strategy = %strategy.name, error = %e, "Failed to start strategy"),
            }
        }

        if started.is_empty() {
            tracing::warn!("No strategies started");
        }
        tracing::info!(
            environment = app.environment(),
            mode = ?mode,
            strategies = ?started,
            "Bot running, press Ctrl-C to stop"
        );
        if let Err(e) = notifier
            .send_notification(
                "system",
                &format!(
                    "Bot started on {} ({:?}): {}",
                    app.environment(),
                    mode,
                    started.join(", ")
                ),
                true,
            )
            .await
        {
            tracing::warn!(error = %e, "Startup notification failed");
        }

        let capture = config.data.capture_enabled.then(|| {
            let recorder = DataRecorder::new(RecorderConfig::from(&config.data));
            let symbols = config.data.symbols.clone();
            let testnet = config.exchange.testnet;
            tokio::spawn(async move { data::capture(recorder, testnet, &symbols, "1m").await })
        });

        // Sender is held for the engine's lifetime; Ctrl-C is handled inside run
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        engine.run(shutdown_rx).await;

        if let Some(handle) = capture {
            match handle.await {
                Ok(Ok(stats)) => tracing::info!(files = stats.files_written, "Capture stopped"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Capture failed"),
                Err(e) => tracing::warn!(error = %e, "Capture task panicked"),
            }
        }

        notifier.notify_strategy("Bot stopped").await;
        db.close().await;
        Ok(())
    }
}
