//! Bybit client errors

use thiserror::Error;

/// Errors returned by the Bybit REST client
#[derive(Debug, Error)]
pub enum BybitError {
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("API credentials are required for {0}")]
    MissingCredentials(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl BybitError {
    /// Classify a non-zero `retCode` response by its message
    pub fn from_response(code: i64, message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") {
            BybitError::RateLimit(message.to_string())
        } else if lower.contains("auth") || lower.contains("signature") {
            BybitError::Auth(message.to_string())
        } else {
            BybitError::Api {
                code,
                message: message.to_string(),
            }
        }
    }

    /// Whether the request may succeed if sent again
    pub fn is_timeout(&self) -> bool {
        match self {
            BybitError::Timeout { .. } => true,
            BybitError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Code stored in the request journal
    pub fn journal_code(&self) -> i64 {
        match self {
            BybitError::Api { code, .. } => *code,
            BybitError::Timeout { .. } => -2,
            BybitError::Http(e) if e.is_timeout() => -2,
            _ => -1,
        }
    }
}
