//! bybit-bot: Headless multi-strategy trading bot for Bybit v5
//!
//! This library provides the core components for:
//! - A rate-limited, caching, signed REST client and a reconnecting WebSocket stream
//! - Technical indicators and five signal strategies
//! - Strategy runners orchestrated by a concurrent engine
//! - Paper/live execution engines
//! - Risk management with daily limits, drawdown tracking and trading blocks
//! - A SQLite trade journal
//! - Telegram notifications
//! - Asset screening
//! - Market-data capture to Parquet
//! - Full observability stack

pub mod bybit;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod data;
pub mod db;
pub mod execution;
pub mod indicators;
pub mod notify;
pub mod risk;
pub mod screener;
pub mod strategy;
pub mod telemetry;
pub mod ws;
