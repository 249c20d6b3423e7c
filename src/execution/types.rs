//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bybit::{Execution, Side};

/// A fill (executed trade)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Exchange order ID
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    /// Fill price
    pub price: Decimal,
    /// Filled quantity in base currency
    pub qty: Decimal,
    /// Fees paid in quote currency
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    /// Quote value of the fill, before fees
    pub fn notional(&self) -> Decimal {
        self.price * self.qty
    }
}

impl From<Execution> for Fill {
    fn from(exec: Execution) -> Self {
        Self {
            order_id: exec.order_id,
            symbol: exec.symbol,
            side: exec.side,
            price: exec.exec_price,
            qty: exec.exec_qty,
            fee: exec.exec_fee,
            timestamp: DateTime::from_timestamp_millis(exec.exec_time).unwrap_or_else(Utc::now),
        }
    }
}

/// Acknowledgement of a submitted order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAck {
    pub order_id: String,
    pub order_link_id: String,
    /// Set when the order filled on submission
    pub fill: Option<Fill>,
}

impl OrderAck {
    /// Price the order filled at, if known
    pub fn fill_price(&self) -> Option<Decimal> {
        self.fill.as_ref().map(|f| f.price)
    }
}

/// Available quote balance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Balance {
    pub total: Decimal,
    pub available: Decimal,
}
