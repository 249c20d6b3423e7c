//! Capture command implementation

use clap::Args;
use std::path::PathBuf;

use super::App;
use crate::data::{self, DataRecorder, RecorderConfig};

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Output directory for captured data (defaults to `data.output_dir`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Symbols to capture (repeatable; defaults to `data.symbols`)
    #[arg(short, long)]
    pub symbol: Vec<String>,

    /// Kline timeframe
    #[arg(short, long, default_value = "1m")]
    pub timeframe: String,
}

impl CaptureArgs {
    pub fn recorder_config(&self, app: &App) -> RecorderConfig {
        let mut config = RecorderConfig::from(&app.config.data);
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        config
    }

    pub fn symbols(&self, app: &App) -> Vec<String> {
        if self.symbol.is_empty() {
            app.config.data.symbols.clone()
        } else {
            self.symbol.iter().map(|s| s.to_uppercase()).collect()
        }
    }

    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        let symbols = self.symbols(app);
        if symbols.is_empty() {
            anyhow::bail!("no symbols to capture");
        }
        let config = self.recorder_config(app);
        let recorder = DataRecorder::new(config);
        let stats = data::capture(recorder, app.config.exchange.testnet, &symbols, &self.timeframe).await?;

        println!("Capture complete");
        println!("  Tickers written: {}", stats.tickers_written);
        println!("  Klines written:  {}", stats.klines_written);
        println!("  Files written:   {}", stats.files_written);
        if stats.write_errors > 0 {
            println!("  Write errors:    {}", stats.write_errors);
        }
        Ok(())
    }
}
