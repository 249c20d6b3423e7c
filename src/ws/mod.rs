//! WebSocket client library
//!
//! Provides a reusable WebSocket client with automatic reconnection,
//! keepalive, per-connection handshake replay, and configurable backoff.

mod client;
mod types;

pub use client::WsClient;
pub use types::{Handshake, Keepalive, WsConfig, WsError, WsMessage};
