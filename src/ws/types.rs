//! WebSocket types and configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Produces the frames sent right after every (re)connect
pub type Handshake = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

/// How the connection is kept alive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keepalive {
    /// Protocol ping frames; a missing pong by the next tick forces a reconnect
    Frame,
    /// Application-level text ping, answered in-band by the server
    Text(String),
}

/// WebSocket client configuration
#[derive(Clone)]
pub struct WsConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Maximum reconnection attempts before giving up (0 = infinite)
    pub max_reconnect_attempts: u32,
    /// Initial delay before first reconnection attempt
    pub initial_reconnect_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_reconnect_delay: Duration,
    /// Interval between keepalive messages
    pub ping_interval: Duration,
    pub keepalive: Keepalive,
    pub handshake: Option<Handshake>,
}

impl fmt::Debug for WsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConfig")
            .field("url", &self.url)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("initial_reconnect_delay", &self.initial_reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("ping_interval", &self.ping_interval)
            .field("keepalive", &self.keepalive)
            .field("handshake", &self.handshake.is_some())
            .finish()
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 10,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            ping_interval: Duration::from_secs(20),
            keepalive: Keepalive::Frame,
            handshake: None,
        }
    }
}

impl WsConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set maximum reconnection attempts
    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    /// Set initial reconnection delay
    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.initial_reconnect_delay = d;
        self
    }

    /// Set maximum reconnection delay
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_reconnect_delay = d;
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Keep alive with a text frame instead of protocol pings
    pub fn text_keepalive(mut self, payload: impl Into<String>) -> Self {
        self.keepalive = Keepalive::Text(payload.into());
        self
    }

    /// Frames to send after every successful connect
    pub fn on_connect<F>(mut self, handshake: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        self.handshake = Some(Arc::new(handshake));
        self
    }
}

/// WebSocket message types
#[derive(Debug, Clone)]
pub enum WsMessage {
    /// Text message
    Text(String),
    /// Binary message
    Binary(Vec<u8>),
    /// Connection established and handshake sent
    Connected,
    /// Connection closed
    Disconnected,
    /// Reconnecting after failure
    Reconnecting { attempt: u32 },
}

/// WebSocket errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Gave up after `max_reconnect_attempts`
    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,
    #[error("Send failed: {0}")]
    SendFailed(String),
}
