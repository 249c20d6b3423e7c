//! Exchange account commands

use clap::Subcommand;
use rust_decimal::Decimal;

use super::App;
use crate::bybit::{AmendRequest, Category, Order};
use crate::notify::AccountStatus;

#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// Check that the API is reachable and the keys are accepted
    TestConnection,
    /// Unified account balance
    Balance {
        /// Also send the balance as a Telegram status message
        #[arg(long)]
        notify: bool,
    },
    /// Open positions
    Positions,
    /// Open orders, or past orders with --history
    Orders {
        #[arg(short, long)]
        symbol: Option<String>,
        #[arg(long)]
        history: bool,
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },
    /// Change the quantity or price of an open order
    Amend {
        symbol: String,
        order_id: String,
        #[arg(long)]
        qty: Option<Decimal>,
        #[arg(long)]
        price: Option<Decimal>,
    },
    /// Set linear position leverage
    Leverage {
        symbol: String,
        buy: Decimal,
        /// Defaults to the buy leverage
        sell: Option<Decimal>,
    },
    /// Switch a linear symbol between cross and isolated margin
    MarginMode {
        symbol: String,
        #[arg(long)]
        isolated: bool,
        #[arg(long, default_value = "1")]
        leverage: Decimal,
    },
}

fn print_orders(orders: &[Order], empty: &str) {
    if orders.is_empty() {
        println!("{}", empty);
    }
    for o in orders {
        println!(
            "{} {:<12} {:<4} {} {} @ {} [{}]",
            o.order_id, o.symbol, o.side, o.order_type, o.qty, o.price, o.order_status
        );
    }
}

impl AccountCommand {
    pub async fn execute(&self, app: &App) -> anyhow::Result<()> {
        match self {
            AccountCommand::TestConnection => {
                let client = app.client(None)?;
                let server_time = client.server_time().await?;
                println!("Environment: {}", app.environment());
                println!("Server time: {}", server_time.format("%Y-%m-%d %H:%M:%S UTC"));
                if !client.has_credentials() {
                    println!("API keys:    not configured (public endpoints only)");
                    return Ok(());
                }
                if client.test_connection().await {
                    let info = client.account_info().await;
                    println!("API keys:    OK");
                    println!("Margin mode: {}", info.margin_mode);
                } else {
                    anyhow::bail!("authenticated request failed; check the API keys");
                }
            }
            AccountCommand::Balance { notify } => {
                let client = app.private_client(None)?;
                let wallets = client.wallet_balance("UNIFIED").await?;
                for wallet in &wallets {
                    println!("{} account", wallet.account_type);
                    println!("  Total equity:      {}", wallet.total_equity);
                    println!("  Wallet balance:    {}", wallet.total_wallet_balance);
                    println!("  Available balance: {}", wallet.total_available_balance);
                    for coin in wallet.coin.iter().filter(|c| !c.wallet_balance.is_zero()) {
                        println!(
                            "  {:<8} {:>18} (${}, uPnL {})",
                            coin.coin, coin.wallet_balance, coin.usd_value, coin.unrealised_pnl
                        );
                    }
                }

                if *notify {
                    let notifier = app.notifier();
                    if !notifier.is_enabled() {
                        anyhow::bail!("Telegram is not configured");
                    }
                    let wallet = wallets.first();
                    let status = AccountStatus {
                        equity: wallet.map(|w| w.total_equity),
                        available: wallet.map(|w| w.total_available_balance),
                        mode: format!("{:?}", app.config.execution.mode),
                        active_strategies: app
                            .config
                            .strategies
                            .iter()
                            .filter(|s| s.auto_start)
                            .map(|s| s.name.clone())
                            .collect(),
                        last_activity: None,
                    };
                    notifier.send_status_update(&status).await?;
                    println!("Status sent to Telegram");
                }
            }
            AccountCommand::Positions => {
                let client = app.private_client(None)?;
                let positions: Vec<_> = client
                    .positions(None)
                    .await?
                    .into_iter()
                    .filter(|p| !p.size.is_zero())
                    .collect();
                if positions.is_empty() {
                    println!("No open positions");
                }
                for p in positions {
                    println!(
                        "{:<12} {:<4} size {} @ {} mark {} uPnL {}",
                        p.symbol, p.side, p.size, p.avg_price, p.mark_price, p.unrealised_pnl
                    );
                }
            }
            AccountCommand::Orders {
                symbol,
                history,
                limit,
            } => {
                let client = app.private_client(None)?;
                if *history {
                    let orders = client.order_history(symbol.as_deref(), *limit).await?;
                    print_orders(&orders, "No order history");
                } else {
                    let orders = client.open_orders(symbol.as_deref()).await?;
                    print_orders(&orders, "No open orders");
                }
            }
            AccountCommand::Amend {
                symbol,
                order_id,
                qty,
                price,
            } => {
                if qty.is_none() && price.is_none() {
                    anyhow::bail!("nothing to amend; pass --qty and/or --price");
                }
                let client = app.private_client(None)?;
                let amend = AmendRequest {
                    category: Category::Spot,
                    symbol: symbol.to_uppercase(),
                    order_id: Some(order_id.clone()),
                    qty: *qty,
                    price: *price,
                    ..AmendRequest::default()
                };
                let ack = client.amend_order(&amend).await?;
                println!("Amended order {}", ack.order_id);
            }
            AccountCommand::Leverage { symbol, buy, sell } => {
                let client = app.private_client(None)?;
                let sell = sell.unwrap_or(*buy);
                client.set_leverage(&symbol.to_uppercase(), *buy, sell).await?;
                println!("Leverage for {} set to {}x buy / {}x sell", symbol.to_uppercase(), buy, sell);
            }
            AccountCommand::MarginMode {
                symbol,
                isolated,
                leverage,
            } => {
                let client = app.private_client(None)?;
                let trade_mode = u8::from(*isolated);
                client
                    .switch_margin_mode(&symbol.to_uppercase(), trade_mode, *leverage, *leverage)
                    .await?;
                println!(
                    "{} switched to {} margin",
                    symbol.to_uppercase(),
                    if *isolated { "isolated" } else { "cross" }
                );
            }
        }
        Ok(())
    }
}
