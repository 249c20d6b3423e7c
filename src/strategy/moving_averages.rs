//! Moving average crossover strategy

use serde::Deserialize;

use super::registry::{StrategyKind, StrategyParams};
use super::types::{require, AnalysisError, MarketSnapshot, Signal, SignalType, Strategy};
use crate::indicators;

/// Moving average flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaType {
    #[default]
    Sma,
    Ema,
    Wma,
}

impl MaType {
    fn compute(&self, values: &[f64], period: usize) -> Option<f64> {
        match self {
            MaType::Sma => indicators::sma(values, period),
            MaType::Ema => indicators::ema(values, period),
            MaType::Wma => indicators::wma(values, period),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MovingAverageParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub ma_type: MaType,
    /// Minimum crossover strength, in percent
    pub min_price_change: f64,
    pub volume_filter: bool,
    pub min_volume_ratio: f64,
}

impl Default for MovingAverageParams {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 30,
            ma_type: MaType::Sma,
            min_price_change: 0.1,
            volume_filter: true,
            min_volume_ratio: 1.2,
        }
    }
}

impl StrategyParams for MovingAverageParams {
    fn validate(&self) -> Result<(), String> {
        if self.fast_period == 0 || self.fast_period >= self.slow_period {
            return Err("fast_period must be positive and below slow_period".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Up,
    Down,
    Sideways,
}

impl Trend {
    fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Sideways => "sideways",
        }
    }
}

const TREND_POINTS: usize = 5;
const VOLUME_WINDOW: usize = 10;

pub struct MovingAverages {
    params: MovingAverageParams,
    buffer: usize,
}

impl MovingAverages {
    pub fn new(params: MovingAverageParams) -> Self {
        let buffer = (params.slow_period * 2).max(200);
        Self { params, buffer }
    }

    fn averages(&self, closes: &[f64]) -> Option<(f64, f64)> {
        let ma = self.params.ma_type;
        Some((
            ma.compute(closes, self.params.fast_period)?,
            ma.compute(closes, self.params.slow_period)?,
        ))
    }

    /// Direction of the slow average over its last few values
    fn trend(&self, closes: &[f64]) -> Trend {
        let slow: Vec<f64> = (0..TREND_POINTS)
            .rev()
            .filter_map(|back| {
                let end = closes.len().checked_sub(back)?;
                self.params.ma_type.compute(&closes[..end], self.params.slow_period)
            })
            .collect();
        if slow.len() < TREND_POINTS {
            return Trend::Sideways;
        }

        let rises = slow.windows(2).filter(|w| w[1] > w[0]).count();
        let falls = slow.windows(2).filter(|w| w[1] < w[0]).count();
        if rises >= 3 {
            Trend::Up
        } else if falls >= 3 {
            Trend::Down
        } else {
            Trend::Sideways
        }
    }

    fn volume_ok(&self, volumes: &[f64]) -> bool {
        if !self.params.volume_filter || volumes.len() < VOLUME_WINDOW {
            return true;
        }
        indicators::volume_ratio(volumes, VOLUME_WINDOW)
            .map(|ratio| ratio >= self.params.min_volume_ratio)
            .unwrap_or(true)
    }
}

impl Strategy for MovingAverages {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MovingAverages
    }

    fn evaluate(&mut self, snapshot: &MarketSnapshot) -> Result<Signal, AnalysisError> {
        let (closes, volumes) = snapshot.history(self.buffer)?;
        require(closes.len(), self.params.slow_period)?;
        let price = snapshot.price_f64();

        let (fast, slow) = self.averages(&closes).ok_or(AnalysisError::InsufficientData {
            required: self.params.slow_period,
            available: closes.len(),
        })?;
        let previous = self.averages(&closes[..closes.len() - 1]);

        let bullish = previous.is_some_and(|(pf, ps)| pf <= ps && fast > slow);
        let bearish = previous.is_some_and(|(pf, ps)| pf >= ps && fast < slow);
        if !bullish && !bearish {
            return Ok(Signal::hold("no crossover"));
        }
        if !self.volume_ok(&volumes) {
            return Ok(Signal::hold("volume below threshold"));
        }

        let strength = if slow != 0.0 {
            (((fast - slow) / slow + (price - slow) / slow) / 2.0).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        if strength.abs() < self.params.min_price_change / 100.0 {
            return Ok(Signal::hold("crossover too weak"));
        }

        let trend = self.trend(&closes);
        let kind = if bullish { SignalType::Buy } else { SignalType::Sell };
        let mut confidence = strength.abs();
        match (kind, trend) {
            (SignalType::Buy, Trend::Up) | (SignalType::Sell, Trend::Down) => confidence *= 1.2,
            (_, Trend::Sideways) => confidence *= 0.8,
            _ => {}
        }

        let direction = if bullish { "Bullish" } else { "Bearish" };
        Ok(Signal::new(
            kind,
            confidence.min(1.0),
            format!("{} MA crossover, trend {}", direction, trend.as_str()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::types::fixtures::{flat_volumes, snapshot};

    fn strategy(fast: usize, slow: usize) -> MovingAverages {
        MovingAverages::new(MovingAverageParams {
            fast_period: fast,
            slow_period: slow,
            volume_filter: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_insufficient_data() {
        let mut ma = strategy(3, 5);
        let snap = snapshot(&[1.0, 2.0, 3.0], &flat_volumes(3));
        assert_eq!(
            ma.evaluate(&snap),
            Err(AnalysisError::InsufficientData {
                required: 5,
                available: 3
            })
        );
    }

    #[test]
    fn test_bullish_crossover_buys() {
        let mut ma = strategy(3, 5);
        // Falling then a sharp rise on the last bar pushes fast above slow
        let closes = [110.0, 108.0, 106.0, 104.0, 102.0, 100.0, 99.0, 98.0, 97.0, 115.0];
        let signal = ma.evaluate(&snapshot(&closes, &flat_volumes(closes.len()))).unwrap();
        assert_eq!(signal.kind, SignalType::Buy);
        assert!(signal.confidence > 0.0);
        assert!(signal.reason.contains("Bullish"));
    }

    #[test]
    fn test_bearish_crossover_sells() {
        let mut ma = strategy(3, 5);
        let closes = [90.0, 92.0, 94.0, 96.0, 98.0, 100.0, 101.0, 102.0, 103.0, 85.0];
        let signal = ma.evaluate(&snapshot(&closes, &flat_volumes(closes.len()))).unwrap();
        assert_eq!(signal.kind, SignalType::Sell);
    }

    #[test]
    fn test_no_crossover_in_steady_trend() {
        let mut ma = strategy(3, 5);
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let signal = ma.evaluate(&snapshot(&closes, &flat_volumes(20))).unwrap();
        assert!(signal.is_hold());
    }

    #[test]
    fn test_volume_filter_blocks_quiet_crossover() {
        let mut ma = MovingAverages::new(MovingAverageParams {
            fast_period: 3,
            slow_period: 5,
            ..Default::default()
        });
        let closes = [110.0, 108.0, 106.0, 104.0, 102.0, 100.0, 99.0, 98.0, 97.0, 115.0];
        let signal = ma.evaluate(&snapshot(&closes, &flat_volumes(closes.len()))).unwrap();
        assert_eq!(signal, Signal::hold("volume below threshold"));

        let mut volumes = flat_volumes(closes.len());
        volumes[9] = 500.0;
        let signal = ma.evaluate(&snapshot(&closes, &volumes)).unwrap();
        assert_eq!(signal.kind, SignalType::Buy);
    }

    #[test]
    fn test_ma_types() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(MaType::Sma.compute(&values, 2), Some(3.5));
        assert!(MaType::Wma.compute(&values, 4).unwrap() > 2.5);
        assert!(MaType::Ema.compute(&values, 4).is_some());
    }
}
