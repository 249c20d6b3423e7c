//! Bybit v5 WebSocket streams
//!
//! Wraps [`WsClient`] with Bybit's handshake (auth for private streams,
//! then subscriptions), the 20 s `{"op":"ping"}` keepalive, and parsing of
//! topic messages into [`StreamEvent`]s.

use super::signer::sign_ws_auth;
use super::types::{de, Execution, Kline, Order, Position, Side, Ticker, WalletBalance};
use crate::credentials::ApiCredentials;
use crate::ws::{WsClient, WsConfig, WsMessage};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

const MAINNET_PUBLIC: &str = "wss://stream.bybit.com/v5/public/spot";
const TESTNET_PUBLIC: &str = "wss://stream-testnet.bybit.com/v5/public/spot";
const MAINNET_PRIVATE: &str = "wss://stream.bybit.com/v5/private";
const TESTNET_PRIVATE: &str = "wss://stream-testnet.bybit.com/v5/private";

/// Bybit rejects subscribe requests with more args than this on spot
const MAX_ARGS_PER_SUBSCRIBE: usize = 10;

/// Topic name builders
pub mod topics {
    pub fn tickers(symbol: &str) -> String {
        format!("tickers.{}", symbol)
    }

    /// `interval` is a Bybit code such as `1` or `D`
    pub fn kline(interval: &str, symbol: &str) -> String {
        format!("kline.{}.{}", interval, symbol)
    }

    pub fn public_trade(symbol: &str) -> String {
        format!("publicTrade.{}", symbol)
    }

    pub fn orderbook(depth: u32, symbol: &str) -> String {
        format!("orderbook.{}.{}", depth, symbol)
    }

    pub const ORDER: &str = "order";
    pub const EXECUTION: &str = "execution";
    pub const POSITION: &str = "position";
    pub const WALLET: &str = "wallet";
}

/// A trade print from `publicTrade.*`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublicTrade {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: Side,
    #[serde(rename = "p", deserialize_with = "de::decimal")]
    pub price: Decimal,
    #[serde(rename = "v", deserialize_with = "de::decimal")]
    pub size: Decimal,
    #[serde(rename = "T")]
    pub time_ms: i64,
    #[serde(rename = "i", default)]
    pub trade_id: String,
}

impl PublicTrade {
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.time_ms)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Deserialize)]
struct StreamKline {
    start: i64,
    #[serde(deserialize_with = "de::decimal")]
    open: Decimal,
    #[serde(deserialize_with = "de::decimal")]
    high: Decimal,
    #[serde(deserialize_with = "de::decimal")]
    low: Decimal,
    #[serde(deserialize_with = "de::decimal")]
    close: Decimal,
    #[serde(deserialize_with = "de::decimal")]
    volume: Decimal,
    #[serde(deserialize_with = "de::decimal", default)]
    turnover: Decimal,
    #[serde(default)]
    confirm: bool,
}

/// Parsed stream output
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    Ticker(Ticker),
    Kline {
        symbol: String,
        interval: String,
        kline: Kline,
        /// The candle is closed
        confirmed: bool,
    },
    Trade(Vec<PublicTrade>),
    Order(Vec<Order>),
    Execution(Vec<Execution>),
    Position(Vec<Position>),
    Wallet(Vec<WalletBalance>),
    Pong,
    Subscribed { success: bool, message: String },
    Auth { success: bool, message: String },
}

/// A public or private Bybit stream
pub struct BybitStream {
    url: String,
    topics: Vec<String>,
    credentials: Option<ApiCredentials>,
    counts: Arc<Mutex<HashMap<String, u64>>>,
}

impl BybitStream {
    /// Spot market data stream
    pub fn public(testnet: bool) -> Self {
        let url = if testnet { TESTNET_PUBLIC } else { MAINNET_PUBLIC };
        Self::with_url(url, None)
    }

    /// Authenticated account stream
    pub fn private(testnet: bool, credentials: ApiCredentials) -> Self {
        let url = if testnet {
            TESTNET_PRIVATE
        } else {
            MAINNET_PRIVATE
        };
        Self::with_url(url, Some(credentials))
    }

    pub fn with_url(url: impl Into<String>, credentials: Option<ApiCredentials>) -> Self {
        Self {
            url: url.into(),
            topics: Vec::new(),
            credentials,
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Add a topic; duplicates are ignored
    pub fn subscribe(mut self, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        if !self.topics.contains(&topic) {
            self.topics.push(topic);
        }
        self
    }

    /// Messages received per topic since the stream was created
    pub async fn message_counts(&self) -> HashMap<String, u64> {
        self.counts.lock().await.clone()
    }

    pub fn subscribe_message(topics: &[String]) -> String {
        json!({ "op": "subscribe", "args": topics }).to_string()
    }

    pub fn auth_message(credentials: &ApiCredentials, expires_ms: i64) -> String {
        json!({
            "op": "auth",
            "args": [
                credentials.api_key,
                expires_ms,
                sign_ws_auth(credentials, expires_ms),
            ]
        })
        .to_string()
    }

    /// Frames sent after each connect: auth first when private, then subscriptions
    pub fn handshake_frames(&self) -> Vec<String> {
        Self::frames(self.credentials.as_ref(), &self.topics)
    }

    fn frames(credentials: Option<&ApiCredentials>, topics: &[String]) -> Vec<String> {
        let mut frames = Vec::new();
        if let Some(credentials) = credentials {
            let expires = Utc::now().timestamp_millis() + 10_000;
            frames.push(Self::auth_message(credentials, expires));
        }
        for chunk in topics.chunks(MAX_ARGS_PER_SUBSCRIBE) {
            frames.push(Self::subscribe_message(chunk));
        }
        frames
    }

    /// Open the stream; events arrive until the receiver is dropped
    pub fn connect(&self) -> mpsc::Receiver<StreamEvent> {
        let (event_tx, event_rx) = mpsc::channel(1024);

        let credentials = self.credentials.clone();
        let topics = self.topics.clone();
        let config = WsConfig::new(self.url.clone())
            .max_reconnects(10)
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(60))
            .ping_interval(Duration::from_secs(20))
            .text_keepalive(json!({ "op": "ping" }).to_string())
            .on_connect(move || Self::frames(credentials.as_ref(), &topics));

        tracing::info!(url = %self.url, topics = ?self.topics, "Subscribing to Bybit stream");

        let ws_rx = WsClient::new(config).connect();
        let counts = self.counts.clone();
        tokio::spawn(async move {
            Self::run_message_loop(ws_rx, event_tx, counts).await;
        });

        event_rx
    }

    async fn run_message_loop(
        mut ws_rx: mpsc::Receiver<WsMessage>,
        event_tx: mpsc::Sender<StreamEvent>,
        counts: Arc<Mutex<HashMap<String, u64>>>,
    ) {
        while let Some(msg) = ws_rx.recv().await {
            let event = match msg {
                WsMessage::Text(text) => match Self::parse_message(&text) {
                    Some((topic, event)) => {
                        if let Some(topic) = topic {
                            *counts.lock().await.entry(topic).or_insert(0) += 1;
                        }
                        event
                    }
                    None => {
                        tracing::trace!(message = %text, "Ignoring unrecognised stream message");
                        continue;
                    }
                },
                WsMessage::Binary(_) => continue,
                WsMessage::Connected => {
                    tracing::info!("Bybit stream connected");
                    StreamEvent::Connected
                }
                WsMessage::Reconnecting { attempt } => {
                    tracing::warn!(attempt, "Bybit stream reconnecting");
                    StreamEvent::Reconnecting { attempt }
                }
                WsMessage::Disconnected => {
                    tracing::warn!("Bybit stream disconnected");
                    let _ = event_tx.send(StreamEvent::Disconnected).await;
                    break;
                }
            };

            if event_tx.send(event).await.is_err() {
                tracing::debug!("Stream receiver dropped, stopping");
                break;
            }
        }
    }

    /// Parse one text frame into its topic (for data messages) and event
    pub fn parse_message(text: &str) -> Option<(Option<String>, StreamEvent)> {
        let value: Value = serde_json::from_str(text).ok()?;

        if let Some(op) = value.get("op").and_then(Value::as_str) {
            let success = value.get("success").and_then(Value::as_bool).unwrap_or(true);
            let message = value
                .get("ret_msg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let event = match op {
                "ping" | "pong" => StreamEvent::Pong,
                "subscribe" => {
                    if !success {
                        tracing::error!(message = %message, "Bybit subscription rejected");
                    }
                    StreamEvent::Subscribed { success, message }
                }
                "auth" => {
                    if !success {
                        tracing::error!(message = %message, "Bybit stream authentication failed");
                    }
                    StreamEvent::Auth { success, message }
                }
                _ => return None,
            };
            return Some((None, event));
        }

        let topic = value.get("topic")?.as_str()?.to_string();
        let data = value.get("data")?.clone();
        let mut parts = topic.split('.');
        let kind = parts.next()?;

        let event = match kind {
            "tickers" => StreamEvent::Ticker(serde_json::from_value(data).ok()?),
            "kline" => {
                let interval = parts.next()?.to_string();
                let symbol = parts.next()?.to_string();
                let raw: Vec<StreamKline> = serde_json::from_value(data).ok()?;
                let last = raw.into_iter().last()?;
                StreamEvent::Kline {
                    symbol,
                    interval,
                    kline: Kline {
                        start: Utc.timestamp_millis_opt(last.start).single()?,
                        open: last.open,
                        high: last.high,
                        low: last.low,
                        close: last.close,
                        volume: last.volume,
                        turnover: last.turnover,
                    },
                    confirmed: last.confirm,
                }
            }
            "publicTrade" => StreamEvent::Trade(serde_json::from_value(data).ok()?),
            "order" => StreamEvent::Order(serde_json::from_value(data).ok()?),
            "execution" => StreamEvent::Execution(serde_json::from_value(data).ok()?),
            "position" => StreamEvent::Position(serde_json::from_value(data).ok()?),
            "wallet" => StreamEvent::Wallet(serde_json::from_value(data).ok()?),
            _ => return None,
        };

        Some((Some(topic), event))
    }
}
