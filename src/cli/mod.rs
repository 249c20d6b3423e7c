//! CLI interface for bybit-bot
//!
//! Provides subcommands for:
//! - `run`: Start the strategy engine
//! - `capture`: Market-data capture only (no trading)
//! - `strategies`, `risk`, `status`, `config`: Inspect the setup
//! - `account`, `db`, `screen`: Exchange, journal and asset tools

mod account;
mod app;
mod capture;
mod db;
mod info;
mod run;
mod screen;

pub use account::AccountCommand;
pub use app::App;
pub use capture::CaptureArgs;
pub use db::DbCommand;
pub use run::RunArgs;
pub use screen::ScreenArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bybit-bot")]
#[command(about = "Headless multi-strategy trading bot for Bybit")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    /// Use the Bybit testnet regardless of the configuration
    #[arg(long, global = true)]
    pub testnet: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the strategy engine
    Run(RunArgs),
    /// Market-data capture only (no trading)
    Capture(CaptureArgs),
    /// List available strategies
    Strategies,
    /// Exchange account tools
    Account {
        #[command(subcommand)]
        command: AccountCommand,
    },
    /// Show risk limits and the current risk report
    Risk,
    /// Trade journal tools
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Rank assets for trading
    Screen(ScreenArgs),
    /// Show current state
    Status,
    /// Show the effective configuration
    Config,
}

impl Commands {
    pub async fn execute(self, app: &App) -> anyhow::Result<()> {
        match self {
            Commands::Run(args) => args.execute(app).await,
            Commands::Capture(args) => args.execute(app).await,
            Commands::Strategies => info::strategies(),
            Commands::Account { command } => command.execute(app).await,
            Commands::Risk => info::risk(app),
            Commands::Db { command } => command.execute(app).await,
            Commands::Screen(args) => args.execute(app).await,
            Commands::Status => info::status(app).await,
            Commands::Config => info::config(app),
        }
    }
}
