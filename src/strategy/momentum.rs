//! Momentum strategy
//!
//! Trades strong, accelerating moves confirmed by volume, with optional RSI
//! and MACD filters. Trend duration persists across evaluations.

use serde::Deserialize;

use super::registry::{StrategyKind, StrategyParams};
use super::types::{require, AnalysisError, MarketSnapshot, Signal, SignalType, Strategy};
use crate::indicators::{self, EmaSeed};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MomentumParams {
    pub momentum_period: usize,
    pub roc_period: usize,
    pub volume_period: usize,
    /// Minimum momentum, in percent
    pub momentum_threshold: f64,
    pub volume_multiplier: f64,
    pub use_rsi_filter: bool,
    pub use_macd_confirmation: bool,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            momentum_period: 14,
            roc_period: 10,
            volume_period: 20,
            momentum_threshold: 2.0,
            volume_multiplier: 1.5,
            use_rsi_filter: true,
            use_macd_confirmation: true,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl StrategyParams for MomentumParams {
    fn validate(&self) -> Result<(), String> {
        if self.momentum_period < 5 {
            return Err("momentum_period must be at least 5".to_string());
        }
        if self.roc_period < 3 {
            return Err("roc_period must be at least 3".to_string());
        }
        if self.momentum_threshold <= 0.0 {
            return Err("momentum_threshold must be positive".to_string());
        }
        if self.volume_period == 0 || self.rsi_period == 0 || self.macd_signal == 0 {
            return Err("volume_period, rsi_period and macd_signal must be positive".to_string());
        }
        if self.macd_fast == 0 || self.macd_fast >= self.macd_slow {
            return Err("macd_fast must be positive and below macd_slow".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TrendState {
    direction: Direction,
    strength: f64,
    acceleration: f64,
    duration: u32,
}

/// Percent change from `period` bars back to the last value
fn pct_change(closes: &[f64], period: usize) -> Option<f64> {
    let past = *closes.get(closes.len().checked_sub(period + 1)?)?;
    let current = *closes.last()?;
    if past == 0.0 {
        return None;
    }
    Some((current - past) / past * 100.0)
}

pub struct MomentumTrading {
    params: MomentumParams,
    buffer: usize,
    trend: Direction,
    trend_duration: u32,
}

impl MomentumTrading {
    pub fn new(params: MomentumParams) -> Self {
        let buffer = (params.momentum_period.max(params.macd_slow) * 3).max(200);
        Self {
            params,
            buffer,
            trend: Direction::Neutral,
            trend_duration: 0,
        }
    }

    pub fn required_data(&self) -> usize {
        let p = &self.params;
        let mut required = (p.momentum_period + 1).max(p.roc_period + 2).max(p.volume_period);
        if p.use_macd_confirmation {
            required = required.max(p.macd_slow + p.macd_signal);
        }
        required
    }

    fn analyze_trend(&mut self, momentum: f64, roc: f64, acceleration: f64) -> TrendState {
        let threshold = self.params.momentum_threshold;
        let (direction, mut strength) = if momentum > threshold && roc > 0.0 {
            (Direction::Bullish, (momentum / threshold).min(3.0))
        } else if momentum < -threshold && roc < 0.0 {
            (Direction::Bearish, (momentum.abs() / threshold).min(3.0))
        } else {
            (Direction::Neutral, 0.0)
        };

        let aligned = matches!(
            (direction, acceleration > 0.0, acceleration < 0.0),
            (Direction::Bullish, true, _) | (Direction::Bearish, _, true)
        );
        if aligned {
            strength *= 1.2;
        } else if acceleration != 0.0 {
            strength *= 0.8;
        }

        if direction == self.trend {
            self.trend_duration += 1;
        } else {
            self.trend = direction;
            self.trend_duration = 1;
        }

        TrendState {
            direction,
            strength: strength.min(3.0),
            acceleration,
            duration: self.trend_duration,
        }
    }

    fn momentum_signal(&self, momentum: f64, trend: &TrendState, volume_ratio: f64, volume_confirmed: bool) -> Option<(SignalType, &'static str)> {
        let side = match trend.direction {
            Direction::Bullish => SignalType::Buy,
            Direction::Bearish => SignalType::Sell,
            Direction::Neutral => return None,
        };
        let accelerating = match trend.direction {
            Direction::Bullish => trend.acceleration > 0.0,
            _ => trend.acceleration < 0.0,
        };
        let p = &self.params;

        if trend.strength >= 1.5 && volume_confirmed && accelerating {
            Some((side, "Strong momentum with volume"))
        } else if trend.strength >= 1.0 && volume_ratio >= p.volume_multiplier * 0.8 {
            Some((side, "Moderate momentum with volume"))
        } else if momentum.abs() > p.momentum_threshold * 0.7 && trend.duration <= 3 {
            Some((side, "Early momentum"))
        } else {
            None
        }
    }
}

/// Overbought buys and oversold sells are rejected
fn rsi_rejects(kind: SignalType, rsi: f64) -> bool {
    match kind {
        SignalType::Buy => rsi >= 70.0,
        SignalType::Sell => rsi <= 30.0,
        _ => false,
    }
}

impl Strategy for MomentumTrading {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MomentumTrading
    }

    fn evaluate(&mut self, snapshot: &MarketSnapshot) -> Result<Signal, AnalysisError> {
        let (closes, volumes) = snapshot.history(self.buffer)?;
        let required = self.required_data();
        require(closes.len(), required)?;
        let insufficient = AnalysisError::InsufficientData {
            required,
            available: closes.len(),
        };

        let p = self.params.clone();
        let momentum = pct_change(&closes, p.momentum_period).ok_or(insufficient.clone())?;
        let roc = pct_change(&closes, p.roc_period).ok_or(insufficient.clone())?;
        let prev_roc = pct_change(&closes[..closes.len() - 1], p.roc_period).ok_or(insufficient)?;
        let acceleration = roc - prev_roc;

        let (volume_ratio, volume_confirmed) = if volumes.len() >= p.volume_period {
            let ratio = indicators::volume_ratio(&volumes, p.volume_period).unwrap_or(1.0);
            (ratio, ratio >= p.volume_multiplier)
        } else {
            (1.0, true)
        };

        let trend = self.analyze_trend(momentum, roc, acceleration);
        let Some((kind, reason)) = self.momentum_signal(momentum, &trend, volume_ratio, volume_confirmed) else {
            return Ok(Signal::hold("no momentum setup"));
        };

        let rsi = indicators::rsi(&closes, p.rsi_period);
        if p.use_rsi_filter {
            if let Some(value) = rsi.filter(|v| rsi_rejects(kind, *v)) {
                return Ok(Signal::hold(format!("RSI filter rejected {} at {:.1}", kind, value)));
            }
        }

        let mut histogram = 0.0;
        if p.use_macd_confirmation {
            if let Some(series) = indicators::macd(&closes, p.macd_fast, p.macd_slow, p.macd_signal, EmaSeed::First) {
                if let Some((m, s, h)) = series.last() {
                    histogram = h;
                    let crossed = series.previous().map(|(pm, ps, _)| (pm <= ps && m > s, pm >= ps && m < s));
                    let (cross_up, cross_down) = crossed.unwrap_or((false, false));
                    let confirmed = match kind {
                        SignalType::Buy => (m > s && h > 0.0) || cross_up || h > 0.0,
                        _ => (m < s && h < 0.0) || cross_down || h < 0.0,
                    };
                    if !confirmed {
                        return Ok(Signal::hold("MACD does not confirm"));
                    }
                }
            }
        }

        let mut confidence = 0.3;
        confidence += (trend.strength * 0.2).min(0.4);
        if volume_ratio > 1.0 {
            confidence += ((volume_ratio - 1.0) * 0.2).min(0.3);
        }
        confidence += (trend.acceleration.abs() * 0.1).min(0.2);
        if p.use_rsi_filter && rsi.is_some_and(|v| (30.0..=70.0).contains(&v)) {
            confidence += 0.1;
        }
        if p.use_macd_confirmation {
            confidence += (histogram.abs() * 10.0).min(0.15);
        }
        if (2..=5).contains(&trend.duration) {
            confidence += 0.1;
        } else if trend.duration > 10 {
            confidence *= 0.8;
        }

        Ok(Signal::new(
            kind,
            confidence.min(1.0),
            format!("{} (momentum {:.2}%, ROC {:.2}%)", reason, momentum, roc),
        ))
    }
}
