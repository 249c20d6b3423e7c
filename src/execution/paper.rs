//! Paper trading execution engine

use super::{Balance, ExecutionEngine, Fill, OrderAck};
use crate::bybit::{OrderRef, OrderRequest, Side};
use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Book {
    balance: Decimal,
    positions: HashMap<String, Decimal>,
    fills: Vec<Fill>,
}

/// Paper trading execution engine with simulated fills
pub struct PaperEngine {
    fee_rate: Decimal,
    book: Arc<RwLock<Book>>,
}

impl PaperEngine {
    /// Create a new paper trading engine
    pub fn new(fee_rate: Decimal, initial_balance: Decimal) -> Self {
        Self {
            fee_rate,
            book: Arc::new(RwLock::new(Book {
                balance: initial_balance,
                ..Default::default()
            })),
        }
    }

    /// Net base position for a symbol (negative when short)
    pub async fn position(&self, symbol: &str) -> Decimal {
        let book = self.book.read().await;
        book.positions.get(symbol).copied().unwrap_or_default()
    }
}

#[async_trait]
impl ExecutionEngine for PaperEngine {
    async fn server_time(&self) -> anyhow::Result<DateTime<Utc>> {
        Ok(Utc::now())
    }

    async fn submit_order(
        &self,
        order: OrderRequest,
        reference_price: Decimal,
    ) -> anyhow::Result<OrderAck> {
        if order.qty <= Decimal::ZERO {
            bail!("order quantity must be positive");
        }
        let price = order.price.unwrap_or(reference_price);
        if price <= Decimal::ZERO {
            bail!("no reference price for {}", order.symbol);
        }

        let notional = order.qty * price;
        let fee = notional * self.fee_rate;
        let mut book = self.book.write().await;

        match order.side {
            Side::Buy => {
                if notional + fee > book.balance {
                    bail!(
                        "insufficient paper balance: need {}, have {}",
                        notional + fee,
                        book.balance
                    );
                }
                book.balance -= notional + fee;
            }
            Side::Sell => book.balance += notional - fee,
        }
        let signed = match order.side {
            Side::Buy => order.qty,
            Side::Sell => -order.qty,
        };
        *book.positions.entry(order.symbol.clone()).or_default() += signed;

        let order_id = Uuid::new_v4().to_string();
        let order_link_id = order
            .order_link_id
            .unwrap_or_else(|| format!("paper-{}", &order_id[..8]));
        let fill = Fill {
            order_id: order_id.clone(),
            symbol: order.symbol,
            side: order.side,
            price,
            qty: order.qty,
            fee,
            timestamp: Utc::now(),
        };
        book.fills.push(fill.clone());

        tracing::info!(
            %order_id,
            symbol = %fill.symbol,
            side = %fill.side,
            %price,
            qty = %fill.qty,
            "Paper order filled"
        );
        Ok(OrderAck {
            order_id,
            order_link_id,
            fill: Some(fill),
        })
    }

    async fn cancel_order(&self, symbol: &str, order: OrderRef) -> anyhow::Result<()> {
        tracing::info!(symbol, ?order, "Paper order cancelled");
        Ok(())
    }

    async fn cancel_all(&self, symbol: Option<&str>) -> anyhow::Result<usize> {
        tracing::info!(?symbol, "Paper orders cancelled");
        Ok(0)
    }

    async fn set_trading_stop(
        &self,
        symbol: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> anyhow::Result<()> {
        tracing::info!(symbol, ?take_profit, ?stop_loss, "Paper trading stop set");
        Ok(())
    }

    async fn fills(&self) -> anyhow::Result<Vec<Fill>> {
        let book = self.book.read().await;
        Ok(book.fills.clone())
    }

    async fn balance(&self) -> anyhow::Result<Balance> {
        let book = self.book.read().await;
        Ok(Balance {
            total: book.balance,
            available: book.balance,
        })
    }

    fn mode(&self) -> &'static str {
        "paper"
    }
}
