//! Trading strategies and their runtime
//!
//! Each strategy turns a [`MarketSnapshot`] into a [`Signal`]. A
//! [`StrategyRunner`] wraps one strategy with position tracking, risk checks
//! and order placement; the [`StrategyEngine`] schedules the runners.

pub mod bollinger;
pub mod engine;
pub mod grid;
pub mod momentum;
pub mod moving_averages;
pub mod registry;
pub mod rsi_macd;
pub mod runner;
pub mod types;

pub use engine::{EngineError, EngineStatus, MarketFeed, StrategyEngine};
pub use registry::{build, build_by_name, StrategyError, StrategyKind, StrategyMetadata};
pub use runner::{
    RunnerContext, RunnerError, RunnerState, RunnerStats, RunnerStatus, StrategyRunner,
    UpdateOutcome,
};
pub use types::{AnalysisError, MarketSnapshot, Signal, SignalType, Strategy};
