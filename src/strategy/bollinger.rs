//! Bollinger band strategy: squeezes, breakouts and mean reversion

use serde::Deserialize;

use super::registry::{StrategyKind, StrategyParams};
use super::types::{require, AnalysisError, MarketSnapshot, Signal, SignalType, Strategy};
use crate::indicators::{self, Bands};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BollingerParams {
    pub period: usize,
    pub std_dev: f64,
    /// Bandwidth contraction that counts as a squeeze, in percent
    pub squeeze_threshold: f64,
    pub breakout_confirmation: bool,
    pub volume_filter: bool,
    pub rsi_filter: bool,
    pub rsi_period: usize,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            period: 20,
            std_dev: 2.0,
            squeeze_threshold: 5.0,
            breakout_confirmation: true,
            volume_filter: true,
            rsi_filter: true,
            rsi_period: 14,
        }
    }
}

impl StrategyParams for BollingerParams {
    fn validate(&self) -> Result<(), String> {
        if self.period < 5 {
            return Err("period must be at least 5".to_string());
        }
        if self.std_dev <= 0.0 {
            return Err("std_dev must be positive".to_string());
        }
        if self.rsi_period == 0 {
            return Err("rsi_period must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RsiZone {
    Oversold,
    Overbought,
    Bearish,
    Bullish,
    Neutral,
}

impl RsiZone {
    fn of(rsi: Option<f64>) -> Self {
        match rsi {
            None => RsiZone::Neutral,
            Some(v) if v <= 30.0 => RsiZone::Oversold,
            Some(v) if v >= 70.0 => RsiZone::Overbought,
            Some(v) if v < 50.0 => RsiZone::Bearish,
            Some(_) => RsiZone::Bullish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Breakout {
    direction: Direction,
    confirmed: bool,
    strength: f64,
}

const SQUEEZE_LOOKBACK: usize = 20;
const VOLUME_WINDOW: usize = 10;
const VOLUME_CONFIRM_RATIO: f64 = 1.2;

pub struct BollingerBands {
    params: BollingerParams,
    buffer: usize,
    squeezed: bool,
    squeeze_duration: u32,
}

impl BollingerBands {
    pub fn new(params: BollingerParams) -> Self {
        let buffer = (params.period * 3).max(200);
        Self {
            params,
            buffer,
            squeezed: false,
            squeeze_duration: 0,
        }
    }

    fn bands_at(&self, closes: &[f64], end: usize) -> Option<Bands> {
        indicators::bollinger(&closes[..end], self.params.period, self.params.std_dev)
    }

    /// Returns (is_squeeze, strength) and advances the squeeze duration
    fn update_squeeze(&mut self, closes: &[f64], current: &Bands) -> (bool, f64) {
        let bandwidths: Vec<f64> = (0..SQUEEZE_LOOKBACK)
            .rev()
            .filter_map(|back| {
                let end = closes.len().checked_sub(back)?;
                self.bands_at(closes, end).map(|b| b.bandwidth)
            })
            .collect();
        if bandwidths.len() < SQUEEZE_LOOKBACK {
            self.squeezed = false;
            self.squeeze_duration = 0;
            return (false, 0.0);
        }

        let avg = bandwidths.iter().sum::<f64>() / SQUEEZE_LOOKBACK as f64;
        let is_squeeze = current.bandwidth < avg * (1.0 - self.params.squeeze_threshold / 100.0);
        self.squeeze_duration = match (is_squeeze, self.squeezed) {
            (true, true) => self.squeeze_duration + 1,
            (true, false) => 1,
            (false, _) => 0,
        };
        self.squeezed = is_squeeze;

        let strength = if avg > 0.0 {
            ((avg - current.bandwidth) / avg).max(0.0)
        } else {
            0.0
        };
        (is_squeeze, strength)
    }

    fn breakout(&self, closes: &[f64], price: f64, current: &Bands) -> Option<Breakout> {
        if closes.len() < 3 {
            return None;
        }
        let previous = self.bands_at(closes, closes.len() - 1)?;
        let prev_price = closes[closes.len() - 2];

        let direction = if prev_price <= previous.upper && price > current.upper {
            Direction::Up
        } else if prev_price >= previous.lower && price < current.lower {
            Direction::Down
        } else {
            return None;
        };

        let confirmed = !self.params.breakout_confirmation
            || match direction {
                Direction::Up => price > current.upper * 1.001,
                Direction::Down => price < current.lower * 0.999,
            };
        let strength = if confirmed {
            match direction {
                Direction::Up => (price - current.upper) / current.upper,
                Direction::Down => (current.lower - price) / current.lower,
            }
        } else {
            0.0
        };

        Some(Breakout {
            direction,
            confirmed,
            strength: strength.min(1.0),
        })
    }

    fn choose(&self, bands: &Bands, price: f64, breakout: Option<Breakout>, zone: RsiZone) -> (SignalType, String) {
        let rsi_allows = |direction: Direction| {
            !self.params.rsi_filter
                || match direction {
                    Direction::Up => zone != RsiZone::Overbought,
                    Direction::Down => zone != RsiZone::Oversold,
                }
        };
        let side = |direction: Direction| match direction {
            Direction::Up => SignalType::Buy,
            Direction::Down => SignalType::Sell,
        };

        if let Some(b) = breakout.filter(|b| b.confirmed) {
            if self.squeeze_duration >= 3 && rsi_allows(b.direction) {
                return (
                    side(b.direction),
                    format!("Breakout after {}-bar squeeze", self.squeeze_duration),
                );
            }
        }

        let oversold = price < bands.lower && bands.percent_b < 10.0;
        let overbought = price > bands.upper && bands.percent_b > 90.0;
        if oversold && (!self.params.rsi_filter || matches!(zone, RsiZone::Oversold | RsiZone::Bearish)) {
            return (SignalType::Buy, format!("Rebound from lower band (%B {:.1})", bands.percent_b));
        }
        if overbought && (!self.params.rsi_filter || matches!(zone, RsiZone::Overbought | RsiZone::Bullish)) {
            return (SignalType::Sell, format!("Rejection at upper band (%B {:.1})", bands.percent_b));
        }

        if let Some(b) = breakout.filter(|b| b.confirmed && b.strength > 0.005) {
            if rsi_allows(b.direction) {
                return (side(b.direction), format!("Band breakout (strength {:.3})", b.strength));
            }
        }

        (SignalType::Hold, "no entry conditions".to_string())
    }
}

impl Strategy for BollingerBands {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BollingerBands
    }

    fn evaluate(&mut self, snapshot: &MarketSnapshot) -> Result<Signal, AnalysisError> {
        let (closes, volumes) = snapshot.history(self.buffer)?;
        require(closes.len(), self.params.period)?;
        let price = snapshot.price_f64();

        let bands = self
            .bands_at(&closes, closes.len())
            .ok_or(AnalysisError::InsufficientData {
                required: self.params.period,
                available: closes.len(),
            })?;
        let (is_squeeze, _) = self.update_squeeze(&closes, &bands);
        let breakout = self.breakout(&closes, price, &bands);

        let volume_ratio = if volumes.len() >= VOLUME_WINDOW {
            indicators::volume_ratio(&volumes, VOLUME_WINDOW).unwrap_or(1.0)
        } else {
            1.0
        };
        let volume_confirmed = volumes.len() < VOLUME_WINDOW || volume_ratio >= VOLUME_CONFIRM_RATIO;
        let rsi = if self.params.rsi_filter {
            indicators::rsi(&closes, self.params.rsi_period)
        } else {
            None
        };

        if self.params.volume_filter && !volume_confirmed {
            return Ok(Signal::hold("volume not confirmed"));
        }

        let (kind, reason) = self.choose(&bands, price, breakout, RsiZone::of(rsi));
        if kind == SignalType::Hold {
            return Ok(Signal::hold(reason));
        }

        let mut confidence = 0.3;
        if is_squeeze {
            confidence += (self.squeeze_duration as f64 * 0.1).min(0.3);
        }
        if let Some(b) = breakout.filter(|b| b.confirmed) {
            confidence += (b.strength * 2.0).min(0.3);
        }
        if bands.percent_b < 10.0 || bands.percent_b > 90.0 {
            confidence += ((50.0 - bands.percent_b).abs() / 100.0).min(0.2);
        }
        confidence *= volume_ratio.min(1.5);
        if let Some(v) = rsi {
            if v <= 30.0 || v >= 70.0 {
                confidence += 0.1;
            }
        }

        Ok(Signal::new(kind, confidence.min(1.0), reason))
    }
}
