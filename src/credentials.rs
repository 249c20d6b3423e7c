//! API credential loading
//!
//! Keys are read from the environment first, then from a `KEY=VALUE` file.
//! Secrets never appear in `Debug` output.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

const BYBIT_API_KEY: &str = "BYBIT_API_KEY";
const BYBIT_API_SECRET: &str = "BYBIT_API_SECRET";
const BYBIT_TESTNET_API_KEY: &str = "BYBIT_TESTNET_API_KEY";
const BYBIT_TESTNET_API_SECRET: &str = "BYBIT_TESTNET_API_SECRET";
const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

const ALL_KEYS: [&str; 6] = [
    BYBIT_API_KEY,
    BYBIT_API_SECRET,
    BYBIT_TESTNET_API_KEY,
    BYBIT_TESTNET_API_SECRET,
    TELEGRAM_BOT_TOKEN,
    TELEGRAM_CHAT_ID,
];

/// A Bybit API key pair
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Telegram bot credentials
#[derive(Clone, PartialEq, Eq)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

impl fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Every credential the bot can use
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub mainnet: Option<ApiCredentials>,
    pub testnet: Option<ApiCredentials>,
    pub telegram: Option<TelegramCredentials>,
}

impl Credentials {
    /// Load from the process environment, falling back to `keys_file`
    pub fn load(keys_file: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = keys_file.as_ref();
        let file_values = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            tracing::debug!(path = %path.display(), "Loaded keys file");
            parse_keys_file(&content)
        } else {
            tracing::debug!(path = %path.display(), "No keys file found");
            HashMap::new()
        };

        let mut values = file_values;
        for key in ALL_KEYS {
            if let Ok(value) = std::env::var(key) {
                if !value.trim().is_empty() {
                    values.insert(key.to_string(), value.trim().to_string());
                }
            }
        }

        Ok(Self::from_values(&values))
    }

    /// Build from already-resolved key/value pairs
    pub fn from_values(values: &HashMap<String, String>) -> Self {
        let pair = |key: &str, secret: &str| -> Option<ApiCredentials> {
            match (non_empty(values, key), non_empty(values, secret)) {
                (Some(k), Some(s)) => Some(ApiCredentials::new(k, s)),
                _ => None,
            }
        };

        let telegram = match (
            non_empty(values, TELEGRAM_BOT_TOKEN),
            non_empty(values, TELEGRAM_CHAT_ID),
        ) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramCredentials { bot_token, chat_id }),
            _ => None,
        };

        Self {
            mainnet: pair(BYBIT_API_KEY, BYBIT_API_SECRET),
            testnet: pair(BYBIT_TESTNET_API_KEY, BYBIT_TESTNET_API_SECRET),
            telegram,
        }
    }

    /// Key pair for the selected environment
    pub fn bybit(&self, testnet: bool) -> Option<&ApiCredentials> {
        if testnet {
            self.testnet.as_ref()
        } else {
            self.mainnet.as_ref()
        }
    }
}

fn non_empty(values: &HashMap<String, String>, key: &str) -> Option<String> {
    values
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `KEY=VALUE` lines, ignoring blanks and `#` comments
pub fn parse_keys_file(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_keys_file() {
        let content = r#"
            # Bybit mainnet
            BYBIT_API_KEY = "abc"
            BYBIT_API_SECRET='def'

            TELEGRAM_CHAT_ID=12345
            not a key line
        "#;
        let values = parse_keys_file(content);
        assert_eq!(values.get("BYBIT_API_KEY").map(String::as_str), Some("abc"));
        assert_eq!(values.get("BYBIT_API_SECRET").map(String::as_str), Some("def"));
        assert_eq!(values.get("TELEGRAM_CHAT_ID").map(String::as_str), Some("12345"));
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_from_values_requires_both_halves() {
        let mut values = HashMap::new();
        values.insert(BYBIT_TESTNET_API_KEY.to_string(), "key".to_string());
        values.insert(BYBIT_API_KEY.to_string(), "main".to_string());
        values.insert(BYBIT_API_SECRET.to_string(), "   ".to_string());

        let creds = Credentials::from_values(&values);
        assert!(creds.testnet.is_none());
        assert!(creds.mainnet.is_none());

        values.insert(BYBIT_TESTNET_API_SECRET.to_string(), "secret".to_string());
        let creds = Credentials::from_values(&values);
        assert_eq!(creds.bybit(true), Some(&ApiCredentials::new("key", "secret")));
        assert!(creds.bybit(false).is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = ApiCredentials::new("visible-key", "super-secret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("visible-key"));
        assert!(!debug.contains("super-secret"));

        let telegram = TelegramCredentials {
            bot_token: "123:token".to_string(),
            chat_id: "42".to_string(),
        };
        assert!(!format!("{:?}", telegram).contains("123:token"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "TELEGRAM_BOT_TOKEN=bot").unwrap();
        writeln!(file, "TELEGRAM_CHAT_ID=chat").unwrap();

        let creds = Credentials::load(file.path()).unwrap();
        let telegram = creds.telegram.unwrap();
        assert_eq!(telegram.chat_id, "chat");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let creds = Credentials::load("/nonexistent/keys").unwrap();
        assert!(creds.telegram.is_none() || std::env::var(TELEGRAM_BOT_TOKEN).is_ok());
    }
}
