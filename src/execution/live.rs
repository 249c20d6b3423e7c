//! Live execution against the Bybit REST API

use super::{Balance, ExecutionEngine, Fill, OrderAck};
use crate::bybit::{BybitClient, OrderRef, OrderRequest};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

const ACCOUNT_TYPE: &str = "UNIFIED";
const QUOTE_COIN: &str = "USDT";
const FILL_HISTORY: u32 = 50;

/// Order link IDs generated by the bot start with this prefix
pub const LINK_ID_PREFIX: &str = "bot-";

pub struct LiveEngine {
    client: Arc<BybitClient>,
}

impl LiveEngine {
    pub fn new(client: Arc<BybitClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExecutionEngine for LiveEngine {
    async fn server_time(&self) -> anyhow::Result<DateTime<Utc>> {
        Ok(self.client.server_time().await?)
    }

    async fn submit_order(
        &self,
        mut order: OrderRequest,
        reference_price: Decimal,
    ) -> anyhow::Result<OrderAck> {
        if order.order_link_id.is_none() {
            order.order_link_id = Some(format!("{}{}", LINK_ID_PREFIX, Uuid::new_v4()));
        }
        let response = self
            .client
            .place_order(&order)
            .await
            .with_context(|| format!("placing {} {} {}", order.side, order.qty, order.symbol))?;

        tracing::debug!(order_id = %response.order_id, %reference_price, "Live order accepted");
        Ok(OrderAck {
            order_id: response.order_id,
            order_link_id: response.order_link_id,
            fill: None,
        })
    }

    async fn cancel_order(&self, symbol: &str, order: OrderRef) -> anyhow::Result<()> {
        self.client.cancel_order(symbol, &order).await?;
        Ok(())
    }

    async fn cancel_all(&self, symbol: Option<&str>) -> anyhow::Result<usize> {
        Ok(self.client.cancel_all_orders(symbol).await?.len())
    }

    async fn set_trading_stop(
        &self,
        symbol: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> anyhow::Result<()> {
        Ok(self
            .client
            .set_trading_stop(symbol, take_profit, stop_loss)
            .await?)
    }

    async fn fills(&self) -> anyhow::Result<Vec<Fill>> {
        let executions = self.client.executions(None, FILL_HISTORY).await?;
        Ok(executions.into_iter().map(Fill::from).collect())
    }

    async fn balance(&self) -> anyhow::Result<Balance> {
        let wallets = self.client.wallet_balance(ACCOUNT_TYPE).await?;
        let wallet = wallets
            .into_iter()
            .next()
            .context("wallet balance response was empty")?;
        let available = wallet
            .coin
            .iter()
            .find(|c| c.coin == QUOTE_COIN)
            .map(|c| c.wallet_balance)
            .unwrap_or(wallet.total_available_balance);
        Ok(Balance {
            total: wallet.total_equity,
            available,
        })
    }

    fn mode(&self) -> &'static str {
        "live"
    }
}
