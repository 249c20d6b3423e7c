//! Grid trading strategy
//!
//! Lays buy levels below and sell levels above the price, with spacing that
//! follows recent volatility. The grid is rebuilt when the price drifts too
//! far from its centre. Fills reported through [`Strategy::on_fill`]
//! retire levels and feed the efficiency score.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeSet, VecDeque};

use super::registry::{StrategyKind, StrategyParams};
use super::types::{require, AnalysisError, MarketSnapshot, Signal, SignalType, Strategy};
use crate::bybit::Side;
use crate::indicators;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridParams {
    pub grid_size: usize,
    /// Distance between levels, in percent
    pub grid_spacing: f64,
    pub base_order_size: f64,
    pub martingale_multiplier: f64,
    pub take_profit_pct: f64,
    pub max_open_orders: usize,
    /// Centre drift that triggers a rebuild, in percent
    pub rebalance_threshold: f64,
    pub use_dynamic_spacing: bool,
    pub volatility_period: usize,
    pub volatility_multiplier: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            grid_size: 10,
            grid_spacing: 1.0,
            base_order_size: 0.01,
            martingale_multiplier: 1.2,
            take_profit_pct: 0.5,
            max_open_orders: 20,
            rebalance_threshold: 5.0,
            use_dynamic_spacing: true,
            volatility_period: 24,
            volatility_multiplier: 2.0,
        }
    }
}

impl StrategyParams for GridParams {
    fn validate(&self) -> Result<(), String> {
        if self.grid_size < 3 {
            return Err("grid_size must be at least 3".to_string());
        }
        if self.grid_spacing <= 0.0 {
            return Err("grid_spacing must be positive".to_string());
        }
        if self.base_order_size <= 0.0 {
            return Err("base_order_size must be positive".to_string());
        }
        if self.volatility_period < 2 {
            return Err("volatility_period must be at least 2".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl VolatilityLevel {
    fn of(volatility: f64) -> Self {
        if volatility < 0.5 {
            VolatilityLevel::Low
        } else if volatility < 2.0 {
            VolatilityLevel::Medium
        } else if volatility < 5.0 {
            VolatilityLevel::High
        } else {
            VolatilityLevel::Extreme
        }
    }

    fn bonus(&self) -> f64 {
        match self {
            VolatilityLevel::Medium => 0.2,
            VolatilityLevel::Low => 0.1,
            _ => -0.1,
        }
    }
}

/// One price level of the grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridLevel {
    pub side: Side,
    /// 1-based distance from the centre
    pub index: u32,
    pub price: f64,
    pub size: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

const SUITABILITY_WINDOW: usize = 50;

pub struct GridTrading {
    params: GridParams,
    buffer: usize,
    levels: Vec<GridLevel>,
    center: Option<f64>,
    /// Levels signalled but not yet filled
    pending: BTreeSet<usize>,
    filled: usize,
    /// Unmatched fills, oldest first
    inventory: VecDeque<(Side, f64, f64)>,
    completed_cycles: u32,
    total_profit: f64,
}

impl GridTrading {
    pub fn new(params: GridParams) -> Self {
        let buffer = (params.volatility_period * 2).max(200);
        Self {
            params,
            buffer,
            levels: Vec::new(),
            center: None,
            pending: BTreeSet::new(),
            filled: 0,
            inventory: VecDeque::new(),
            completed_cycles: 0,
            total_profit: 0.0,
        }
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn center(&self) -> Option<f64> {
        self.center
    }

    pub fn completed_cycles(&self) -> u32 {
        self.completed_cycles
    }

    pub fn total_profit(&self) -> f64 {
        self.total_profit
    }

    /// Volatility of percent returns and the spacing derived from it
    fn volatility(&self, closes: &[f64]) -> (f64, f64) {
        let p = &self.params;
        let window = &closes[closes.len().saturating_sub(p.volatility_period)..];
        let returns = indicators::pct_returns(window);
        let volatility = match returns.as_slice() {
            [] => return (1.0, p.grid_spacing),
            [only] => only.abs(),
            _ => indicators::stdev(&returns).unwrap_or(1.0),
        };
        let spacing = if p.use_dynamic_spacing {
            (volatility * p.volatility_multiplier).clamp(p.grid_spacing * 0.5, p.grid_spacing * 3.0)
        } else {
            p.grid_spacing
        };
        (volatility, spacing)
    }

    fn build_grid(&mut self, price: f64, spacing: f64, now: DateTime<Utc>) {
        let p = &self.params;
        let buys = p.grid_size / 2;
        let sells = p.grid_size - buys;
        let level = |side: Side, i: usize| {
            let offset = spacing * i as f64 / 100.0;
            GridLevel {
                side,
                index: i as u32,
                price: match side {
                    Side::Buy => price * (1.0 - offset),
                    Side::Sell => price * (1.0 + offset),
                },
                size: p.base_order_size * p.martingale_multiplier.powi(i as i32 - 1),
                active: true,
                created_at: now,
            }
        };

        let mut levels: Vec<GridLevel> = (1..=buys).map(|i| level(Side::Buy, i)).collect();
        levels.extend((1..=sells).map(|i| level(Side::Sell, i)));

        self.levels = levels;
        self.center = Some(price);
        self.pending.clear();
        tracing::debug!(price, spacing, levels = self.levels.len(), "Grid rebuilt");
    }

    fn needs_rebuild(&self, price: f64) -> bool {
        match self.center {
            Some(center) if !self.levels.is_empty() && center > 0.0 => {
                (price - center).abs() / center * 100.0 > self.params.rebalance_threshold
            }
            _ => true,
        }
    }

    /// Suitability score in [0, 1] for range trading
    fn suitability(&self, closes: &[f64]) -> f64 {
        if closes.len() < SUITABILITY_WINDOW {
            return 0.5;
        }
        let recent = &closes[closes.len() - SUITABILITY_WINDOW..];
        let mut score: f64 = 0.0;

        let trend = indicators::linear_slope(recent)
            .filter(|_| recent[0] != 0.0)
            .map(|slope| slope * recent.len() as f64 / recent[0] * 100.0)
            .unwrap_or(0.0);
        if trend.abs() < 2.0 {
            score += 0.4;
        } else if trend.abs() > 5.0 {
            score -= 0.3;
        }

        let max = recent.iter().cloned().fold(f64::MIN, f64::max);
        let min = recent.iter().cloned().fold(f64::MAX, f64::min);
        if min > 0.0 {
            let range = (max - min) / min * 100.0;
            if (3.0..=15.0).contains(&range) {
                score += 0.3;
            } else if !(1.0..=20.0).contains(&range) {
                score -= 0.2;
            }
        }

        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        let std = (recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / recent.len() as f64).sqrt();
        let cv = if mean > 0.0 { std / mean } else { 1.0 };
        let stability = (1.0 - cv * 10.0).clamp(0.0, 1.0);
        if stability > 0.7 {
            score += 0.3;
        } else if stability < 0.3 {
            score -= 0.2;
        }

        (score + 0.5).clamp(0.0, 1.0)
    }

    fn efficiency(&self) -> f64 {
        if self.filled == 0 {
            return 0.5;
        }
        let total = self.pending.len() + self.filled;
        let fill_rate = self.filled as f64 / total as f64;
        let avg_profit = self.total_profit / self.completed_cycles.max(1) as f64;

        let fill_factor = (fill_rate * 2.0).min(1.0);
        let profit_factor = if avg_profit > 0.0 {
            (avg_profit / (self.params.base_order_size * 0.01)).min(1.0)
        } else {
            0.0
        };
        let cycle_factor = (self.completed_cycles as f64 / 10.0).min(1.0);
        (fill_factor + profit_factor + cycle_factor) / 3.0
    }

    fn priority(&self, level: &GridLevel, price: f64, now: DateTime<Utc>) -> f64 {
        let distance = (price - level.price).abs() / price;
        let proximity = (0.3 - distance * 10.0).max(0.0);
        let size_penalty = (level.size / self.params.base_order_size * 0.1).min(0.2);
        let age_hours = (now - level.created_at).num_seconds().max(0) as f64 / 3600.0;
        let age_bonus = (age_hours * 0.1).min(0.2);
        (0.5 + proximity - size_penalty + age_bonus).clamp(0.0, 1.0)
    }

    /// Nearest active level of `side` on the far side of the price
    fn nearest(&self, side: Side, price: f64) -> Option<usize> {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.active && l.side == side)
            .filter(|(_, l)| match side {
                Side::Buy => l.price < price,
                Side::Sell => l.price > price,
            })
            .min_by(|(_, a), (_, b)| {
                (a.price - price).abs().total_cmp(&(b.price - price).abs())
            })
            .map(|(i, _)| i)
    }
}

impl Strategy for GridTrading {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GridTrading
    }

    fn evaluate(&mut self, snapshot: &MarketSnapshot) -> Result<Signal, AnalysisError> {
        let (closes, _) = snapshot.history(self.buffer)?;
        require(closes.len(), self.params.volatility_period)?;
        let price = snapshot.price_f64();
        let now = snapshot.timestamp;

        let (volatility, spacing) = self.volatility(&closes);
        if self.needs_rebuild(price) {
            self.build_grid(price, spacing, now);
            return Ok(Signal::hold(format!("grid initialised around {:.2}", price)));
        }

        let suitability = self.suitability(&closes);
        if suitability < 0.4 {
            return Ok(Signal::hold(format!("market unsuitable for grid ({:.2})", suitability)));
        }

        let mut candidates = Vec::new();
        if let Some(i) = self.nearest(Side::Buy, price) {
            if price <= self.levels[i].price * 1.001 {
                candidates.push(i);
            }
        }
        if let Some(i) = self.nearest(Side::Sell, price) {
            if price >= self.levels[i].price * 0.999 {
                candidates.push(i);
            }
        }
        let best = candidates
            .into_iter()
            .map(|i| (i, self.priority(&self.levels[i], price, now)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((index, priority)) = best else {
            return Ok(Signal::hold("no grid level reached"));
        };
        if self.pending.len() >= self.params.max_open_orders {
            return Ok(Signal::hold(format!(
                "open order limit reached ({})",
                self.params.max_open_orders
            )));
        }
        self.pending.insert(index);

        let level = &self.levels[index];
        let tp = self.params.take_profit_pct / 100.0;
        let (kind, target) = match level.side {
            Side::Buy => (SignalType::Buy, level.price * (1.0 + tp)),
            Side::Sell => (SignalType::Sell, level.price * (1.0 - tp)),
        };

        let confidence = 0.4
            + priority * 0.2
            + VolatilityLevel::of(volatility).bonus()
            + suitability * 0.2
            + self.efficiency() * 0.2;

        Ok(Signal::new(
            kind,
            confidence.min(1.0),
            format!(
                "{} level #{} at {:.2} reached, target {:.2}",
                level.side, level.index, level.price, target
            ),
        ))
    }

    fn on_fill(&mut self, side: Side, price: f64, qty: f64) {
        let closest = self
            .levels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.active && l.side == side)
            .min_by(|(_, a), (_, b)| {
                (a.price - price).abs().total_cmp(&(b.price - price).abs())
            })
            .map(|(i, _)| i);
        if let Some(i) = closest {
            self.levels[i].active = false;
            self.pending.remove(&i);
        }
        self.filled += 1;

        match self.inventory.front() {
            Some(&(open_side, open_price, open_qty)) if open_side != side => {
                self.inventory.pop_front();
                let matched = qty.min(open_qty);
                let profit = match open_side {
                    Side::Buy => (price - open_price) * matched,
                    Side::Sell => (open_price - price) * matched,
                };
                self.total_profit += profit;
                self.completed_cycles += 1;
                tracing::debug!(profit, cycles = self.completed_cycles, "Grid cycle completed");
            }
            _ => self.inventory.push_back((side, price, qty)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::types::fixtures::{flat_volumes, snapshot};
    use rust_decimal::Decimal;

    fn ranging(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 }).collect()
    }

    fn at_price(closes: &[f64], price: f64) -> MarketSnapshot {
        let mut snap = snapshot(closes, &flat_volumes(closes.len()));
        snap.price = Decimal::try_from(price).unwrap();
        snap
    }

    fn fixed_spacing() -> GridParams {
        GridParams {
            use_dynamic_spacing: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate() {
        assert!(GridParams::default().validate().is_ok());
        let bad = GridParams {
            grid_size: 2,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = GridParams {
            grid_spacing: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_first_evaluation_builds_grid() {
        let mut grid = GridTrading::new(fixed_spacing());
        let closes = ranging(60);
        let signal = grid.evaluate(&at_price(&closes, 100.0)).unwrap();
        assert!(signal.is_hold());
        assert_eq!(grid.center(), Some(100.0));

        let levels = grid.levels();
        assert_eq!(levels.len(), 10);
        assert_eq!(levels.iter().filter(|l| l.side == Side::Buy).count(), 5);
        assert!((levels[0].price - 99.0).abs() < 1e-9);
        assert!((levels[1].price - 98.0).abs() < 1e-9);
        assert!((levels[1].size - 0.012).abs() < 1e-12);
        assert!((levels[5].price - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_buy_level_reached() {
        let mut grid = GridTrading::new(fixed_spacing());
        let closes = ranging(60);
        grid.evaluate(&at_price(&closes, 100.0)).unwrap();

        let signal = grid.evaluate(&at_price(&closes, 99.05)).unwrap();
        assert_eq!(signal.kind, SignalType::Buy);
        assert!(signal.reason.contains("#1"));
        assert!(signal.confidence > 0.5);

        let signal = grid.evaluate(&at_price(&closes, 100.98)).unwrap();
        assert_eq!(signal.kind, SignalType::Sell);

        let signal = grid.evaluate(&at_price(&closes, 100.5)).unwrap();
        assert!(signal.is_hold());
    }

    #[test]
    fn test_drift_rebuilds_grid() {
        let mut grid = GridTrading::new(fixed_spacing());
        let closes = ranging(60);
        grid.evaluate(&at_price(&closes, 100.0)).unwrap();
        let signal = grid.evaluate(&at_price(&closes, 106.0)).unwrap();
        assert!(signal.reason.starts_with("grid initialised"));
        assert_eq!(grid.center(), Some(106.0));
    }

    #[test]
    fn test_fill_retires_level_and_counts_cycle() {
        let mut grid = GridTrading::new(fixed_spacing());
        let closes = ranging(60);
        grid.evaluate(&at_price(&closes, 100.0)).unwrap();
        grid.evaluate(&at_price(&closes, 99.05)).unwrap();

        grid.on_fill(Side::Buy, 99.0, 0.01);
        assert!(!grid.levels()[0].active);
        assert_eq!(grid.completed_cycles(), 0);

        // The next buy level is now #2
        let signal = grid.evaluate(&at_price(&closes, 99.05)).unwrap();
        assert!(signal.is_hold());

        grid.on_fill(Side::Sell, 101.0, 0.01);
        assert_eq!(grid.completed_cycles(), 1);
        assert!((grid.total_profit() - 0.02).abs() < 1e-9);
        assert!(grid.efficiency() > 0.5);
    }

    #[test]
    fn test_dynamic_spacing_clamped() {
        let grid = GridTrading::new(GridParams::default());
        let calm = vec![100.0; 30];
        assert_eq!(grid.volatility(&calm), (0.0, 0.5));

        let wild: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 110.0 } else { 90.0 }).collect();
        let (vol, spacing) = grid.volatility(&wild);
        assert!(vol > 5.0);
        assert_eq!(spacing, 3.0);
        assert_eq!(VolatilityLevel::of(vol), VolatilityLevel::Extreme);
    }

    #[test]
    fn test_suitability() {
        let grid = GridTrading::new(GridParams::default());
        assert_eq!(grid.suitability(&ranging(10)), 0.5);

        // Flat range: weak trend, narrow range, high stability
        let score = grid.suitability(&ranging(60));
        assert!((score - 1.0).abs() < 1e-9);

        let trending: Vec<f64> = (0..60).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        assert!(grid.suitability(&trending) < 0.4);
    }
}
