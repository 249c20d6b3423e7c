//! Strategy registry
//!
//! Maps configuration names to strategy constructors and describes each
//! strategy for the `strategies` command.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use super::bollinger::{BollingerBands, BollingerParams};
use super::grid::{GridParams, GridTrading};
use super::momentum::{MomentumParams, MomentumTrading};
use super::moving_averages::{MovingAverageParams, MovingAverages};
use super::rsi_macd::{RsiMacd, RsiMacdParams};
use super::types::Strategy;

/// Strategy construction errors
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy '{0}'")]
    Unknown(String),

    #[error("invalid parameters for {kind}: {message}")]
    InvalidParams { kind: StrategyKind, message: String },
}

/// Every strategy the bot can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MovingAverages,
    RsiMacd,
    BollingerBands,
    MomentumTrading,
    GridTrading,
}

/// Human-facing description of a strategy
#[derive(Debug, Clone, Serialize)]
pub struct StrategyMetadata {
    pub display_name: &'static str,
    pub description: &'static str,
    pub risk_level: &'static str,
    pub timeframe: &'static str,
    pub suitable_for: &'static [&'static str],
    pub not_suitable_for: &'static [&'static str],
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::MovingAverages,
        StrategyKind::RsiMacd,
        StrategyKind::BollingerBands,
        StrategyKind::MomentumTrading,
        StrategyKind::GridTrading,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::MovingAverages => "moving_averages",
            StrategyKind::RsiMacd => "rsi_macd",
            StrategyKind::BollingerBands => "bollinger_bands",
            StrategyKind::MomentumTrading => "momentum_trading",
            StrategyKind::GridTrading => "grid_trading",
        }
    }

    pub fn metadata(&self) -> StrategyMetadata {
        match self {
            StrategyKind::MovingAverages => StrategyMetadata {
                display_name: "Moving Averages",
                description: "Fast/slow moving average crossovers with trend and volume checks",
                risk_level: "Medium",
                timeframe: "1m-1h",
                suitable_for: &["Trending markets", "Medium volatility"],
                not_suitable_for: &["Sideways markets", "High volatility"],
            },
            StrategyKind::RsiMacd => StrategyMetadata {
                display_name: "RSI + MACD",
                description: "RSI extremes combined with MACD crossovers and histogram momentum",
                risk_level: "Medium-High",
                timeframe: "5m-4h",
                suitable_for: &["Trending markets", "Reversals"],
                not_suitable_for: &["Very low volatility"],
            },
            StrategyKind::BollingerBands => StrategyMetadata {
                display_name: "Bollinger Bands",
                description: "Band squeezes, breakouts and mean reversion from the bands",
                risk_level: "Medium",
                timeframe: "15m-4h",
                suitable_for: &["Range-bound markets", "Volatility breakouts"],
                not_suitable_for: &["Strong trending markets", "Very low volatility"],
            },
            StrategyKind::MomentumTrading => StrategyMetadata {
                display_name: "Momentum Trading",
                description: "Momentum and rate of change with volume, RSI and MACD confirmation",
                risk_level: "High",
                timeframe: "5m-1h",
                suitable_for: &["Strong trends", "Breakouts", "High volatility"],
                not_suitable_for: &["Sideways markets", "Low volume"],
            },
            StrategyKind::GridTrading => StrategyMetadata {
                display_name: "Grid Trading",
                description: "Buy and sell levels around the price with volatility-based spacing",
                risk_level: "Medium-High",
                timeframe: "1m-15m",
                suitable_for: &["Sideways markets", "Range-bound trading", "High liquidity assets"],
                not_suitable_for: &["Strong trending markets", "Low liquidity assets"],
            },
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy parameters deserialised from a TOML table
pub trait StrategyParams: DeserializeOwned {
    fn validate(&self) -> Result<(), String>;
}

fn parse<P: StrategyParams>(kind: StrategyKind, table: &toml::Table) -> Result<P, StrategyError> {
    let invalid = |message: String| StrategyError::InvalidParams { kind, message };
    let params: P = toml::Value::Table(table.clone())
        .try_into()
        .map_err(|e: toml::de::Error| invalid(e.to_string()))?;
    params.validate().map_err(invalid)?;
    Ok(params)
}

/// Construct a strategy from its kind and parameter table
pub fn build(kind: StrategyKind, params: &toml::Table) -> Result<Box<dyn Strategy>, StrategyError> {
    let strategy: Box<dyn Strategy> = match kind {
        StrategyKind::MovingAverages => {
            Box::new(MovingAverages::new(parse::<MovingAverageParams>(kind, params)?))
        }
        StrategyKind::RsiMacd => Box::new(RsiMacd::new(parse::<RsiMacdParams>(kind, params)?)),
        StrategyKind::BollingerBands => {
            Box::new(BollingerBands::new(parse::<BollingerParams>(kind, params)?))
        }
        StrategyKind::MomentumTrading => {
            Box::new(MomentumTrading::new(parse::<MomentumParams>(kind, params)?))
        }
        StrategyKind::GridTrading => Box::new(GridTrading::new(parse::<GridParams>(kind, params)?)),
    };
    Ok(strategy)
}

/// Construct a strategy from its registry name
pub fn build_by_name(name: &str, params: &toml::Table) -> Result<Box<dyn Strategy>, StrategyError> {
    let kind = StrategyKind::from_name(name).ok_or_else(|| StrategyError::Unknown(name.to_string()))?;
    build(kind, params)
}
