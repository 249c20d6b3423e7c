//! Asset screener
//!
//! Ranks USDT spot pairs by a weighted 0-100 score built from turnover,
//! volatility, spread, trend, drawdown and a strategy-specific heuristic.

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bybit::Ticker;
use crate::indicators::{linear_slope, max_drawdown, sma, stdev};
use crate::strategy::MarketFeed;

/// Minimum 24h turnover in USDT for a non-zero volume score
pub const MIN_TURNOVER_24H: f64 = 1_000_000.0;
/// Volatility above this fraction scores zero
pub const MAX_VOLATILITY: f64 = 0.15;

pub const FALLBACK_ASSETS: [&str; 15] = [
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "XRPUSDT", "SOLUSDT", "ADAUSDT", "DOGEUSDT", "MATICUSDT",
    "DOTUSDT", "AVAXUSDT", "LINKUSDT", "UNIUSDT", "LTCUSDT", "ATOMUSDT", "NEARUSDT",
];

const KLINE_TIMEFRAME: &str = "1h";
/// One week of hourly candles
const KLINE_LIMIT: u32 = 168;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub volume: f64,
    pub volatility: f64,
    pub liquidity: f64,
    pub trend: f64,
    pub risk: f64,
    pub strategy: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        let total = self.volume * 0.2
            + self.volatility * 0.15
            + self.liquidity * 0.2
            + self.trend * 0.15
            + self.risk * 0.15
            + self.strategy * 0.15;
        total.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetScore {
    pub symbol: String,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// USDT pairs with short enough symbols to be mainstream spot listings
pub fn is_candidate(symbol: &str) -> bool {
    symbol.ends_with("USDT") && symbol.len() <= 10
}

/// Log-scaled turnover: 0 below the minimum, +20 per decade above it
pub fn volume_score(turnover_24h: f64) -> f64 {
    if turnover_24h < MIN_TURNOVER_24H {
        return 0.0;
    }
    ((turnover_24h.log10() - MIN_TURNOVER_24H.log10()) * 20.0).clamp(0.0, 100.0)
}

/// Relative standard deviation of the last 24 closes. 2-8% is ideal.
pub fn volatility_score(closes: &[f64]) -> f64 {
    if closes.len() < 24 {
        return 0.0;
    }
    let window = &closes[closes.len() - 24..];
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let Some(sd) = stdev(window) else {
        return 0.0;
    };
    if mean <= 0.0 {
        return 0.0;
    }
    let volatility = sd / mean;
    if (0.02..=0.08).contains(&volatility) {
        100.0
    } else if volatility < 0.02 {
        volatility * 5000.0
    } else if volatility > MAX_VOLATILITY {
        0.0
    } else {
        (100.0 - (volatility - 0.08) * 1000.0).max(0.0)
    }
}

/// Spread buckets; 50 when the book is empty
pub fn liquidity_score(bid: f64, ask: f64) -> f64 {
    if bid <= 0.0 || ask <= 0.0 {
        return 50.0;
    }
    let spread = (ask - bid) / ((ask + bid) / 2.0);
    if spread <= 0.001 {
        100.0
    } else if spread <= 0.005 {
        80.0
    } else if spread <= 0.01 {
        60.0
    } else {
        (60.0 - (spread - 0.01) * 1000.0).max(0.0)
    }
}

/// Regression slope of the last 48 closes, normalised by their mean.
/// A gentle uptrend scores best, sideways next.
pub fn trend_score(closes: &[f64]) -> f64 {
    if closes.len() < 48 {
        return 50.0;
    }
    let window = &closes[closes.len() - 48..];
    let avg = window.iter().sum::<f64>() / window.len() as f64;
    let Some(slope) = linear_slope(window) else {
        return 50.0;
    };
    if avg <= 0.0 {
        return 50.0;
    }
    let normalized = slope / avg;
    if (0.001..=0.01).contains(&normalized) {
        100.0
    } else if (-0.001..=0.001).contains(&normalized) {
        70.0
    } else {
        (70.0 - normalized.abs() * 1000.0).max(0.0)
    }
}

/// Drawdown buckets over the last 24 closes
pub fn risk_score(closes: &[f64]) -> f64 {
    if closes.len() < 24 {
        return 50.0;
    }
    let drawdown = max_drawdown(&closes[closes.len() - 24..]);
    if drawdown <= 0.05 {
        100.0
    } else if drawdown <= 0.1 {
        80.0
    } else if drawdown <= 0.2 {
        60.0
    } else {
        (60.0 - (drawdown - 0.2) * 200.0).max(0.0)
    }
}

fn momentum_fit(closes: &[f64]) -> f64 {
    let window = &closes[closes.len().saturating_sub(24)..];
    let moves: Vec<f64> = window
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| ((w[1] - w[0]) / w[0]).abs())
        .collect();
    if moves.is_empty() {
        return 50.0;
    }
    let avg = moves.iter().sum::<f64>() / moves.len() as f64;
    if (0.005..=0.02).contains(&avg) {
        100.0
    } else {
        (100.0 - (avg - 0.0125).abs() * 4000.0).max(0.0)
    }
}

fn grid_fit(closes: &[f64]) -> f64 {
    let window = &closes[closes.len().saturating_sub(48)..];
    let max = window.iter().cloned().fold(f64::MIN, f64::max);
    let min = window.iter().cloned().fold(f64::MAX, f64::min);
    let avg = window.iter().sum::<f64>() / window.len() as f64;
    if avg <= 0.0 {
        return 50.0;
    }
    let range = (max - min) / avg;
    if (0.03..=0.08).contains(&range) {
        100.0
    } else {
        (100.0 - (range - 0.055).abs() * 1000.0).max(0.0)
    }
}

fn moving_average_fit(closes: &[f64]) -> f64 {
    let (Some(ma20), Some(&price)) = (sma(closes, 20), closes.last()) else {
        return 50.0;
    };
    if ma20 <= 0.0 {
        return 50.0;
    }
    let distance = (price - ma20).abs() / ma20;
    if (0.01..=0.05).contains(&distance) {
        100.0
    } else {
        (100.0 - (distance - 0.03).abs() * 2000.0).max(0.0)
    }
}

/// How well the recent price action suits a strategy; 50 when neutral
pub fn strategy_score(closes: &[f64], strategy: Option<&str>) -> f64 {
    let Some(strategy) = strategy.map(str::to_lowercase) else {
        return 50.0;
    };
    if closes.len() < 24 {
        return 50.0;
    }
    if strategy.contains("momentum") {
        momentum_fit(closes)
    } else if strategy.contains("grid") {
        grid_fit(closes)
    } else if strategy.contains("moving") || strategy.contains("ma") {
        moving_average_fit(closes)
    } else {
        50.0
    }
}

/// Score one asset from its ticker and closes (oldest first)
pub fn score_asset(ticker: &Ticker, closes: &[f64], strategy: Option<&str>) -> ScoreBreakdown {
    ScoreBreakdown {
        volume: volume_score(ticker.turnover_24h.to_f64().unwrap_or_default()),
        volatility: volatility_score(closes),
        liquidity: liquidity_score(
            ticker.bid_price.to_f64().unwrap_or_default(),
            ticker.ask_price.to_f64().unwrap_or_default(),
        ),
        trend: trend_score(closes),
        risk: risk_score(closes),
        strategy: strategy_score(closes, strategy),
    }
}

/// Pad `selected` from the fallback list up to `count`, skipping duplicates
pub fn fill_from_fallback(mut selected: Vec<String>, count: usize) -> Vec<String> {
    for asset in FALLBACK_ASSETS {
        if selected.len() >= count {
            break;
        }
        if !selected.iter().any(|s| s == asset) {
            selected.push(asset.to_string());
        }
    }
    selected.truncate(count);
    selected
}

pub struct AssetScreener<F: MarketFeed> {
    feed: Arc<F>,
    /// Candidates analysed, by descending turnover
    max_candidates: usize,
}

impl<F: MarketFeed> AssetScreener<F> {
    pub fn new(feed: Arc<F>) -> Self {
        Self {
            feed,
            max_candidates: 50,
        }
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    /// Score every candidate, best first
    pub async fn rank(&self, strategy: Option<&str>) -> anyhow::Result<Vec<AssetScore>> {
        let mut candidates: Vec<Ticker> = self
            .feed
            .all_tickers()
            .await?
            .into_iter()
            .filter(|t| is_candidate(&t.symbol))
            .collect();
        candidates.sort_by(|a, b| b.turnover_24h.cmp(&a.turnover_24h));
        candidates.truncate(self.max_candidates);
        info!(candidates = candidates.len(), ?strategy, "Screening assets");

        let mut scores = Vec::new();
        for ticker in candidates {
            let klines = match self
                .feed
                .klines(&ticker.symbol, KLINE_TIMEFRAME, KLINE_LIMIT)
                .await
            {
                Ok(klines) if !klines.is_empty() => klines,
                Ok(_) => continue,
                Err(e) => {
                    debug!(symbol = %ticker.symbol, error = %e, "Skipping asset");
                    continue;
                }
            };
            let closes: Vec<f64> = klines
                .iter()
                .map(|k| k.close.to_f64().unwrap_or_default())
                .collect();
            let breakdown = score_asset(&ticker, &closes, strategy);
            let score = breakdown.total();
            if score > 0.0 {
                scores.push(AssetScore {
                    symbol: ticker.symbol.clone(),
                    score,
                    breakdown,
                });
            }
        }
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scores)
    }

    /// The `count` best symbols, padded from the fallback list
    pub async fn select_best(&self, strategy: Option<&str>, count: usize) -> Vec<String> {
        let ranked = match self.rank(strategy).await {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(error = %e, "Screening failed, using fallback assets");
                Vec::new()
            }
        };
        let selected = ranked
            .into_iter()
            .take(count)
            .map(|a| a.symbol)
            .collect();
        let selected = fill_from_fallback(selected, count);
        info!(?selected, "Assets selected");
        selected
    }
}
