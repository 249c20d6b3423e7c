//! Screen command implementation

use clap::Args;
use std::sync::Arc;

use super::App;
use crate::screener::{fill_from_fallback, AssetScreener};

#[derive(Args, Debug)]
pub struct ScreenArgs {
    /// Score assets for this strategy kind
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Number of assets to show
    #[arg(short = 'n', long, default_value = "5")]
    pub count: usize,
}

impl ScreenArgs {
    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        let screener = AssetScreener::new(Arc::new(app.client(None)?));
        let strategy = self.strategy.as_deref();

        match screener.rank(strategy).await {
            Ok(scores) if !scores.is_empty() => {
                println!(
                    "{:<4} {:<14} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
                    "#", "Symbol", "Total", "Volume", "Vol", "Liq", "Trend", "Risk", "Fit"
                );
                for (i, score) in scores.iter().take(self.count).enumerate() {
                    let b = &score.breakdown;
                    println!(
                        "{:<4} {:<14} {:>7.1} {:>7.1} {:>7.1} {:>7.1} {:>7.1} {:>7.1} {:>7.1}",
                        i + 1,
                        score.symbol,
                        score.score,
                        b.volume,
                        b.volatility,
                        b.liquidity,
                        b.trend,
                        b.risk,
                        b.strategy
                    );
                }
            }
            Ok(_) => {
                println!("No assets passed the screen; fallback selection:");
                print_fallback(self.count);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Screening failed, using fallback assets");
                println!("Screening failed ({}); fallback selection:", e);
                print_fallback(self.count);
            }
        }
        Ok(())
    }
}

fn print_fallback(count: usize) {
    for symbol in fill_from_fallback(Vec::new(), count) {
        println!("  {}", symbol);
    }
}
