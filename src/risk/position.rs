//! Open position tracking with stop-loss and take-profit

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::bybit::Side;

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    Manual,
    Shutdown,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::Signal => "signal",
            ExitReason::Manual => "manual",
            ExitReason::Shutdown => "shutdown",
        }
    }
}

/// An open position. `Side::Buy` is long, `Side::Sell` is short.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub entry_time: DateTime<Utc>,
    pub order_id: String,
}

impl Position {
    /// Open at `price` with stop-loss and take-profit distances in percent
    pub fn open(
        symbol: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
        order_id: impl Into<String>,
    ) -> Self {
        let sl = stop_loss_pct / Decimal::ONE_HUNDRED;
        let tp = take_profit_pct / Decimal::ONE_HUNDRED;
        let (stop_loss, take_profit) = match side {
            Side::Buy => (price * (Decimal::ONE - sl), price * (Decimal::ONE + tp)),
            Side::Sell => (price * (Decimal::ONE + sl), price * (Decimal::ONE - tp)),
        };
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            entry_price: price,
            size,
            stop_loss,
            take_profit,
            entry_time: Utc::now(),
            order_id: order_id.into(),
        }
    }

    pub fn is_long(&self) -> bool {
        self.side == Side::Buy
    }

    /// Unrealised return at `price`, in percent
    pub fn pnl_pct(&self, price: Decimal) -> f64 {
        if self.entry_price.is_zero() {
            return 0.0;
        }
        let change = (price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED;
        let signed = if self.is_long() { change } else { -change };
        signed.to_f64().unwrap_or(0.0)
    }

    /// Unrealised profit at `price`, in quote currency
    pub fn pnl(&self, price: Decimal) -> Decimal {
        let diff = price - self.entry_price;
        let signed = if self.is_long() { diff } else { -diff };
        signed * self.size
    }

    /// Stop-loss or take-profit hit at `price`
    pub fn exit_trigger(&self, price: Decimal) -> Option<ExitReason> {
        let (stopped, took_profit) = if self.is_long() {
            (price <= self.stop_loss, price >= self.take_profit)
        } else {
            (price >= self.stop_loss, price <= self.take_profit)
        };
        if stopped {
            Some(ExitReason::StopLoss)
        } else if took_profit {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }
}

/// A closed position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: Decimal,
    pub exit_time: DateTime<Utc>,
    pub pnl: Decimal,
    pub pnl_pct: f64,
    pub reason: ExitReason,
}

impl ClosedPosition {
    pub fn new(position: Position, exit_price: Decimal, reason: ExitReason) -> Self {
        Self {
            pnl: position.pnl(exit_price),
            pnl_pct: position.pnl_pct(exit_price),
            exit_price,
            exit_time: Utc::now(),
            reason,
            position,
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_long_levels_and_pnl() {
        let pos = Position::open("BTCUSDT", Side::Buy, dec!(100), dec!(2), dec!(2), dec!(4), "o1");
        assert_eq!(pos.stop_loss, dec!(98));
        assert_eq!(pos.take_profit, dec!(104));
        assert_eq!(pos.pnl(dec!(101)), dec!(2));
        assert!((pos.pnl_pct(dec!(101)) - 1.0).abs() < 1e-9);

        assert_eq!(pos.exit_trigger(dec!(97.5)), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_trigger(dec!(104)), Some(ExitReason::TakeProfit));
        assert_eq!(pos.exit_trigger(dec!(100)), None);
    }

    #[test]
    fn test_short_levels_and_pnl() {
        let pos = Position::open("BTCUSDT", Side::Sell, dec!(100), dec!(1), dec!(2), dec!(4), "o2");
        assert_eq!(pos.stop_loss, dec!(102));
        assert_eq!(pos.take_profit, dec!(96));
        assert_eq!(pos.pnl(dec!(95)), dec!(5));
        assert!((pos.pnl_pct(dec!(95)) - 5.0).abs() < 1e-9);

        assert_eq!(pos.exit_trigger(dec!(102.5)), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_trigger(dec!(95)), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn test_closed_position() {
        let pos = Position::open("ETHUSDT", Side::Buy, dec!(200), dec!(1), dec!(2), dec!(4), "o3");
        let closed = ClosedPosition::new(pos, dec!(190), ExitReason::StopLoss);
        assert_eq!(closed.pnl, dec!(-10));
        assert!((closed.pnl_pct + 5.0).abs() < 1e-9);
        assert!(!closed.is_win());
    }
}
