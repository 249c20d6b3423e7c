//! RSI + MACD strategy
//!
//! RSI extremes and MACD crossovers vote independently. Agreement is
//! filtered by the short/long SMA trend, conflicts hold.

use serde::Deserialize;

use super::registry::{StrategyKind, StrategyParams};
use super::types::{require, AnalysisError, MarketSnapshot, Signal, SignalType, Strategy};
use crate::indicators::{self, EmaSeed, MacdSeries};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RsiMacdParams {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub min_histogram: f64,
    pub volume_confirmation: bool,
    pub trend_filter: bool,
}

impl Default for RsiMacdParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            min_histogram: 0.001,
            volume_confirmation: true,
            trend_filter: true,
        }
    }
}

impl StrategyParams for RsiMacdParams {
    fn validate(&self) -> Result<(), String> {
        if self.macd_fast == 0 || self.macd_fast >= self.macd_slow {
            return Err("macd_fast must be positive and below macd_slow".to_string());
        }
        if self.rsi_period == 0 || self.macd_signal == 0 {
            return Err("rsi_period and macd_signal must be positive".to_string());
        }
        if !(0.0 < self.rsi_oversold
            && self.rsi_oversold < self.rsi_overbought
            && self.rsi_overbought < 100.0)
        {
            return Err("RSI levels must satisfy 0 < oversold < overbought < 100".to_string());
        }
        Ok(())
    }
}

/// One indicator's opinion
#[derive(Debug, Clone, Copy, PartialEq)]
struct Vote {
    kind: SignalType,
    strength: f64,
    reason: &'static str,
}

impl Vote {
    fn hold(reason: &'static str) -> Self {
        Self {
            kind: SignalType::Hold,
            strength: 0.0,
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

const VOLUME_WINDOW: usize = 10;
const VOLUME_CONFIRM_RATIO: f64 = 1.1;
const TREND_SHORT: usize = 10;
const TREND_LONG: usize = 20;
const TREND_BAND: f64 = 0.005;

pub struct RsiMacd {
    params: RsiMacdParams,
    buffer: usize,
}

impl RsiMacd {
    pub fn new(params: RsiMacdParams) -> Self {
        let buffer = (params.macd_slow * 3).max(200);
        Self { params, buffer }
    }

    pub fn required_data(&self) -> usize {
        self.params.rsi_period.max(self.params.macd_slow) + self.params.macd_signal
    }

    fn rsi_vote(&self, rsi: f64) -> Vote {
        let p = &self.params;
        if rsi <= p.rsi_oversold {
            Vote {
                kind: SignalType::Buy,
                strength: (p.rsi_oversold - rsi) / p.rsi_oversold,
                reason: "RSI oversold",
            }
        } else if rsi >= p.rsi_overbought {
            Vote {
                kind: SignalType::Sell,
                strength: (rsi - p.rsi_overbought) / (100.0 - p.rsi_overbought),
                reason: "RSI overbought",
            }
        } else if rsi < 50.0 {
            Vote::hold("RSI bearish zone")
        } else {
            Vote::hold("RSI bullish zone")
        }
    }

    fn macd_vote(&self, macd: &MacdSeries) -> Vote {
        let crossover = match (macd.previous(), macd.last()) {
            (Some((pm, ps, _)), Some((m, s, _))) => {
                let strength = if s != 0.0 { ((m - s).abs() / s.abs()).min(1.0) } else { 0.5 };
                if pm <= ps && m > s {
                    Some(Vote {
                        kind: SignalType::Buy,
                        strength,
                        reason: "MACD bullish crossover",
                    })
                } else if pm >= ps && m < s {
                    Some(Vote {
                        kind: SignalType::Sell,
                        strength,
                        reason: "MACD bearish crossover",
                    })
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(vote) = crossover {
            return vote;
        }

        let hist = &macd.histogram;
        if hist.len() < 3 {
            return Vote::hold("no MACD signal");
        }
        let recent = &hist[hist.len() - 3..];
        let current = recent[2];
        let min = self.params.min_histogram;
        let rising = recent.iter().all(|h| *h > 0.0) && recent.windows(2).all(|w| w[1] > w[0]);
        let falling = recent.iter().all(|h| *h < 0.0) && recent.windows(2).all(|w| w[1] < w[0]);

        if rising && current > min {
            Vote {
                kind: SignalType::Buy,
                strength: (current / min).min(1.0),
                reason: "MACD histogram rising",
            }
        } else if falling && current.abs() > min {
            Vote {
                kind: SignalType::Sell,
                strength: (current.abs() / min).min(1.0),
                reason: "MACD histogram falling",
            }
        } else {
            Vote::hold("no MACD signal")
        }
    }

    /// Volume ratio and whether it confirms
    fn volume(&self, volumes: &[f64]) -> (f64, bool) {
        if volumes.len() < VOLUME_WINDOW {
            return (1.0, true);
        }
        let ratio = indicators::volume_ratio(volumes, VOLUME_WINDOW).unwrap_or(1.0);
        (ratio, ratio >= VOLUME_CONFIRM_RATIO)
    }

    fn trend(&self, closes: &[f64]) -> (Trend, f64) {
        let (Some(short), Some(long)) = (
            indicators::sma(closes, TREND_SHORT),
            indicators::sma(closes, TREND_LONG),
        ) else {
            return (Trend::Neutral, 0.0);
        };
        if long == 0.0 {
            return (Trend::Neutral, 0.0);
        }
        let strength = ((short - long).abs() / long).min(1.0);
        if short > long * (1.0 + TREND_BAND) {
            (Trend::Bullish, strength)
        } else if short < long * (1.0 - TREND_BAND) {
            (Trend::Bearish, strength)
        } else {
            (Trend::Neutral, strength)
        }
    }

    fn combine(&self, rsi: Vote, macd: Vote, trend: Trend) -> (SignalType, &'static str) {
        match (rsi.kind, macd.kind) {
            (SignalType::Hold, SignalType::Hold) => (SignalType::Hold, "no signal"),
            (a, b) if a == b => {
                let aligned = matches!(
                    (a, trend),
                    (_, Trend::Neutral) | (SignalType::Buy, Trend::Bullish) | (SignalType::Sell, Trend::Bearish)
                );
                if !self.params.trend_filter || aligned {
                    (a, "RSI and MACD agree")
                } else {
                    (SignalType::Hold, "signal against trend")
                }
            }
            (SignalType::Hold, b) => (b, macd.reason),
            (a, SignalType::Hold) => (a, rsi.reason),
            _ => (SignalType::Hold, "RSI and MACD conflict"),
        }
    }
}

impl Strategy for RsiMacd {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RsiMacd
    }

    fn evaluate(&mut self, snapshot: &MarketSnapshot) -> Result<Signal, AnalysisError> {
        let (closes, volumes) = snapshot.history(self.buffer)?;
        let required = self.required_data();
        require(closes.len(), required)?;
        let insufficient = AnalysisError::InsufficientData {
            required,
            available: closes.len(),
        };

        let p = &self.params;
        let rsi = indicators::rsi(&closes, p.rsi_period).ok_or(insufficient.clone())?;
        let macd = indicators::macd(&closes, p.macd_fast, p.macd_slow, p.macd_signal, EmaSeed::Sma)
            .ok_or(insufficient)?;

        let rsi_vote = self.rsi_vote(rsi);
        let macd_vote = self.macd_vote(&macd);
        let (volume_ratio, volume_confirmed) = self.volume(&volumes);
        let (trend, trend_strength) = if closes.len() >= TREND_LONG {
            self.trend(&closes)
        } else {
            (Trend::Neutral, 0.0)
        };

        let (kind, reason) = self.combine(rsi_vote, macd_vote, trend);
        if kind == SignalType::Hold {
            return Ok(Signal::hold(reason));
        }
        if p.volume_confirmation && !volume_confirmed {
            return Ok(Signal::hold("volume not confirmed"));
        }

        let mut confidence = (rsi_vote.strength + macd_vote.strength) / 2.0;
        if p.volume_confirmation {
            confidence *= volume_ratio.min(1.5);
        }
        if trend != Trend::Neutral {
            confidence *= 1.0 + trend_strength * 0.3;
        }

        Ok(Signal::new(
            kind,
            confidence.min(1.0),
            format!("{} (RSI {:.1})", reason, rsi),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::types::fixtures::{flat_volumes, snapshot};

    fn quiet_params() -> RsiMacdParams {
        RsiMacdParams {
            volume_confirmation: false,
            trend_filter: false,
            ..Default::default()
        }
    }

    fn decelerating_decline() -> Vec<f64> {
        (0..60).map(|i| 200.0 - 20.0 * ((i + 1) as f64).sqrt()).collect()
    }

    #[test]
    fn test_validate() {
        assert!(RsiMacdParams::default().validate().is_ok());
        let bad = RsiMacdParams {
            rsi_oversold: 80.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = RsiMacdParams {
            macd_fast: 30,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_required_data() {
        let strategy = RsiMacd::new(RsiMacdParams::default());
        assert_eq!(strategy.required_data(), 35);

        let mut strategy = RsiMacd::new(quiet_params());
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let result = strategy.evaluate(&snapshot(&closes, &flat_volumes(30)));
        assert_eq!(
            result,
            Err(AnalysisError::InsufficientData {
                required: 35,
                available: 30
            })
        );
    }

    #[test]
    fn test_rsi_votes() {
        let strategy = RsiMacd::new(RsiMacdParams::default());
        let vote = strategy.rsi_vote(15.0);
        assert_eq!(vote.kind, SignalType::Buy);
        assert!((vote.strength - 0.5).abs() < 1e-9);

        let vote = strategy.rsi_vote(85.0);
        assert_eq!(vote.kind, SignalType::Sell);
        assert!((vote.strength - 0.5).abs() < 1e-9);

        assert_eq!(strategy.rsi_vote(45.0).kind, SignalType::Hold);
    }

    #[test]
    fn test_combine() {
        let strategy = RsiMacd::new(RsiMacdParams::default());
        let buy = Vote {
            kind: SignalType::Buy,
            strength: 0.5,
            reason: "buy",
        };
        let sell = Vote {
            kind: SignalType::Sell,
            strength: 0.5,
            reason: "sell",
        };
        let hold = Vote::hold("hold");

        assert_eq!(strategy.combine(buy, buy, Trend::Bullish).0, SignalType::Buy);
        assert_eq!(strategy.combine(buy, buy, Trend::Neutral).0, SignalType::Buy);
        assert_eq!(strategy.combine(buy, buy, Trend::Bearish).0, SignalType::Hold);
        assert_eq!(strategy.combine(buy, sell, Trend::Neutral).0, SignalType::Hold);
        assert_eq!(strategy.combine(hold, sell, Trend::Bullish), (SignalType::Sell, "sell"));
        assert_eq!(strategy.combine(hold, hold, Trend::Neutral).0, SignalType::Hold);
    }

    #[test]
    fn test_falling_market_is_oversold_buy() {
        let mut strategy = RsiMacd::new(quiet_params());
        let closes = decelerating_decline();
        let signal = strategy.evaluate(&snapshot(&closes, &flat_volumes(60))).unwrap();
        // Every change is a loss so RSI is 0; MACD can only agree or abstain
        assert_eq!(signal.kind, SignalType::Buy);
        assert!(signal.confidence > 0.0);
    }

    #[test]
    fn test_volume_confirmation_holds() {
        let mut strategy = RsiMacd::new(RsiMacdParams {
            trend_filter: false,
            ..Default::default()
        });
        let closes = decelerating_decline();
        let signal = strategy.evaluate(&snapshot(&closes, &flat_volumes(60))).unwrap();
        assert_eq!(signal, Signal::hold("volume not confirmed"));
    }

    #[test]
    fn test_trend_detection() {
        let strategy = RsiMacd::new(RsiMacdParams::default());
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(strategy.trend(&rising).0, Trend::Bullish);
        let flat = vec![100.0; 30];
        assert_eq!(strategy.trend(&flat), (Trend::Neutral, 0.0));
    }
}
