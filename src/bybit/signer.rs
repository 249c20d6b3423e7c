//! Bybit v5 request signing (HMAC-SHA256)

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::credentials::ApiCredentials;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed by `secret`
pub fn hmac_hex(secret: &str, payload: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Headers attached to an authenticated REST request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub api_key: String,
    pub timestamp: String,
    pub recv_window: String,
    pub signature: String,
}

impl SignedHeaders {
    /// Header name/value pairs in the order Bybit documents them
    pub fn pairs(&self) -> [(&'static str, &str); 5] {
        [
            ("X-BAPI-API-KEY", self.api_key.as_str()),
            ("X-BAPI-SIGN", self.signature.as_str()),
            ("X-BAPI-SIGN-TYPE", "2"),
            ("X-BAPI-TIMESTAMP", self.timestamp.as_str()),
            ("X-BAPI-RECV-WINDOW", self.recv_window.as_str()),
        ]
    }
}

/// Sign a REST request
///
/// `payload` is the query string for GET requests and the JSON body for POST.
pub fn sign_request(
    credentials: &ApiCredentials,
    timestamp_ms: i64,
    recv_window_ms: u64,
    payload: &str,
) -> SignedHeaders {
    let timestamp = timestamp_ms.to_string();
    let recv_window = recv_window_ms.to_string();
    let message = format!(
        "{}{}{}{}",
        timestamp, credentials.api_key, recv_window, payload
    );
    SignedHeaders {
        api_key: credentials.api_key.clone(),
        signature: hmac_hex(&credentials.api_secret, &message),
        timestamp,
        recv_window,
    }
}

/// Signature for the private WebSocket `auth` operation
pub fn sign_ws_auth(credentials: &ApiCredentials, expires_ms: i64) -> String {
    hmac_hex(&credentials.api_secret, &format!("GET/realtime{}", expires_ms))
}
