//! Bybit v5 API access
//!
//! REST client with signing, rate limiting and caching, plus the
//! public and private WebSocket streams.

mod cache;
mod client;
mod error;
mod rate_limit;
mod signer;
pub mod stream;
pub mod types;

pub use cache::{cache_key, ResponseCache};
pub use client::{
    query_string, ApiRequestRecord, BybitClient, RequestJournal, RequestStats, MAINNET_URL,
    TESTNET_URL,
};
pub use error::BybitError;
pub use rate_limit::{RateLimitStatus, RateLimiter};
pub use signer::{hmac_hex, sign_request, sign_ws_auth, SignedHeaders};
pub use stream::{topics, BybitStream, PublicTrade, StreamEvent};
pub use types::*;
