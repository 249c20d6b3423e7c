//! WebSocket client with automatic reconnection

use super::types::{Keepalive, WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Reusable WebSocket client with reconnection, handshake replay and keepalive
pub struct WsClient {
    config: WsConfig,
}

enum Outcome {
    /// Server closed or the consumer went away
    Closed,
    /// Failed after the connection was established
    Dropped(WsError),
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and return a receiver for messages
    ///
    /// A background task owns the connection and replays the handshake on
    /// every reconnect. Status events (Connected, Disconnected, Reconnecting)
    /// arrive on the same channel as frames. Dropping the receiver ends the task.
    pub fn connect(&self) -> mpsc::Receiver<WsMessage> {
        let (tx, rx) = mpsc::channel(1024);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_loop(config, tx, None).await {
                tracing::error!(error = %e, "WebSocket connection loop failed");
            }
        });

        rx
    }

    /// Connect and return a sender for outbound text frames alongside the receiver
    ///
    /// Frames queued while the link is down are sent once it is back, after
    /// the handshake. Dropping the sender leaves the connection receive-only.
    pub fn connect_bidirectional(&self) -> (mpsc::Sender<String>, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(1024);
        let (send_tx, send_rx) = mpsc::channel(256);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_loop(config, tx, Some(send_rx)).await {
                tracing::error!(error = %e, "WebSocket bidirectional loop failed");
            }
        });

        (send_tx, rx)
    }

    async fn run_loop(
        config: WsConfig,
        tx: mpsc::Sender<WsMessage>,
        mut send_rx: Option<mpsc::Receiver<String>>,
    ) -> Result<(), WsError> {
        let mut reconnect_attempts = 0;
        let mut reconnect_delay = config.initial_reconnect_delay;

        loop {
            let error = match Self::connect_and_stream(&config, &tx, &mut send_rx).await {
                Ok(Outcome::Closed) => {
                    tracing::info!(url = %config.url, "WebSocket connection closed");
                    let _ = tx.send(WsMessage::Disconnected).await;
                    return Ok(());
                }
                Ok(Outcome::Dropped(e)) => {
                    // the link was up, so start backing off from scratch
                    reconnect_attempts = 0;
                    reconnect_delay = config.initial_reconnect_delay;
                    e
                }
                Err(e) => e,
            };

            reconnect_attempts += 1;
            tracing::warn!(
                error = %error,
                attempt = reconnect_attempts,
                "WebSocket connection error, reconnecting"
            );

            // 0 = infinite
            if config.max_reconnect_attempts > 0
                && reconnect_attempts >= config.max_reconnect_attempts
            {
                tracing::error!("Max reconnection attempts reached");
                let _ = tx.send(WsMessage::Disconnected).await;
                return Err(WsError::MaxReconnectsExceeded);
            }

            if tx.is_closed() {
                tracing::info!("Receiver dropped, stopping reconnection");
                return Ok(());
            }

            let _ = tx
                .send(WsMessage::Reconnecting {
                    attempt: reconnect_attempts,
                })
                .await;

            sleep(reconnect_delay).await;
            reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
        }
    }

    /// Returns `Err` when the connection could not be established at all
    async fn connect_and_stream(
        config: &WsConfig,
        tx: &mpsc::Sender<WsMessage>,
        send_rx: &mut Option<mpsc::Receiver<String>>,
    ) -> Result<Outcome, WsError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&config.url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        if let Some(handshake) = &config.handshake {
            for frame in handshake() {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    return Ok(Outcome::Dropped(WsError::SendFailed(e.to_string())));
                }
            }
        }

        tracing::info!(url = %config.url, "WebSocket connected");
        if tx.send(WsMessage::Connected).await.is_err() {
            return Ok(Outcome::Closed);
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately
        ping_interval.tick().await;

        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    let forwarded = match msg {
                        Some(Ok(Message::Text(text))) => tx.send(WsMessage::Text(text)).await,
                        Some(Ok(Message::Binary(data))) => tx.send(WsMessage::Binary(data)).await,
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return Ok(Outcome::Dropped(WsError::SendFailed(e.to_string())));
                            }
                            Ok(())
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                            Ok(())
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Received close frame");
                            return Ok(Outcome::Closed);
                        }
                        Some(Ok(_)) => Ok(()),
                        Some(Err(e)) => {
                            return Ok(Outcome::Dropped(WsError::ConnectionFailed(e.to_string())));
                        }
                        None => {
                            return Ok(Outcome::Dropped(WsError::ConnectionFailed(
                                "Stream ended unexpectedly".into(),
                            )));
                        }
                    };
                    if forwarded.is_err() {
                        tracing::debug!("Receiver dropped, closing connection");
                        return Ok(Outcome::Closed);
                    }
                }

                outbound = async {
                    match send_rx.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match outbound {
                        Some(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                return Ok(Outcome::Dropped(WsError::SendFailed(e.to_string())));
                            }
                        }
                        None => *send_rx = None,
                    }
                }

                _ = ping_interval.tick() => {
                    let sent = match &config.keepalive {
                        Keepalive::Frame => {
                            if waiting_for_pong {
                                return Ok(Outcome::Dropped(WsError::ConnectionFailed(
                                    "Pong timeout".into(),
                                )));
                            }
                            waiting_for_pong = true;
                            write.send(Message::Ping(Vec::new())).await
                        }
                        Keepalive::Text(payload) => write.send(Message::Text(payload.clone())).await,
                    };
                    if let Err(e) = sent {
                        return Ok(Outcome::Dropped(WsError::SendFailed(e.to_string())));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ws_client_with_config() {
        let config = WsConfig::new("wss://test.com")
            .max_reconnects(5)
            .ping_interval(Duration::from_secs(15));

        let client = WsClient::new(config);
        assert_eq!(client.url(), "wss://test.com");
        assert_eq!(client.config.max_reconnect_attempts, 5);
        assert_eq!(client.config.ping_interval, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_ws_client_connection_failure() {
        let client = WsClient::new(
            WsConfig::new("wss://invalid.localhost.test:12345")
                .max_reconnects(2)
                .initial_delay(Duration::from_millis(10)),
        );

        let mut rx = client.connect();

        let mut reconnects = 0;
        let mut got_disconnect = false;
        let timeout = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(msg) = rx.recv().await {
                match msg {
                    WsMessage::Disconnected => {
                        got_disconnect = true;
                        break;
                    }
                    WsMessage::Reconnecting { .. } => reconnects += 1,
                    _ => {}
                }
            }
        });

        timeout.await.expect("Test timed out");
        assert!(got_disconnect, "Should receive Disconnected message");
        assert_eq!(reconnects, 1);
    }

    #[tokio::test]
    async fn test_bidirectional_frames_reach_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::channel::<String>(8);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let _ = seen_tx.send(text).await;
                }
            }
        });

        let client = WsClient::new(
            WsConfig::new(format!("ws://{}", addr))
                .max_reconnects(1)
                .ping_interval(Duration::from_secs(60))
                .on_connect(|| vec![r#"{"op":"subscribe","args":["tickers.BTCUSDT"]}"#.to_string()]),
        );
        let (send_tx, mut rx) = client.connect_bidirectional();

        let connected = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Test timed out");
        assert!(matches!(connected, Some(WsMessage::Connected)));

        send_tx
            .send(r#"{"op":"unsubscribe","args":["tickers.BTCUSDT"]}"#.to_string())
            .await
            .unwrap();

        let frames = tokio::time::timeout(Duration::from_secs(5), async {
            let first = seen_rx.recv().await.unwrap();
            let second = seen_rx.recv().await.unwrap();
            (first, second)
        })
        .await
        .expect("Test timed out");
        assert!(frames.0.contains("\"subscribe\""));
        assert!(frames.1.contains("\"unsubscribe\""));
    }
}
