//! Execution engine module
//!
//! Handles order submission (paper and live modes)

mod live;
mod paper;
mod types;

pub use live::LiveEngine;
pub use paper::PaperEngine;
pub use types::{Balance, Fill, OrderAck};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::bybit::{OrderRef, OrderRequest};

/// Trait for execution engine implementations
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Exchange clock, used as a connectivity check
    async fn server_time(&self) -> anyhow::Result<DateTime<Utc>>;
    /// Submit an order. `reference_price` is the last known market price.
    async fn submit_order(
        &self,
        order: OrderRequest,
        reference_price: Decimal,
    ) -> anyhow::Result<OrderAck>;
    /// Cancel an order
    async fn cancel_order(&self, symbol: &str, order: OrderRef) -> anyhow::Result<()>;
    /// Cancel every open order, optionally for one symbol
    async fn cancel_all(&self, symbol: Option<&str>) -> anyhow::Result<usize>;
    /// Attach exchange-side take-profit and stop-loss
    async fn set_trading_stop(
        &self,
        symbol: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> anyhow::Result<()>;
    /// Recent fills
    async fn fills(&self) -> anyhow::Result<Vec<Fill>>;
    /// Quote currency balance
    async fn balance(&self) -> anyhow::Result<Balance>;
    /// Human-readable mode name
    fn mode(&self) -> &'static str;
}
