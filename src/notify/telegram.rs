//! Telegram Bot API notifier

use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::credentials::TelegramCredentials;

const API_URL: &str = "https://api.telegram.org";
const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

pub fn emoji_for(kind: &str) -> &'static str {
    match kind.to_lowercase().as_str() {
        "trade" => "💰",
        "strategy" => "🤖",
        "alert" => "⚠️",
        "error" => "❌",
        "balance" => "💳",
        "market" => "📈",
        "system" => "⚙️",
        _ => "📢",
    }
}

pub fn format_notification(kind: &str, text: &str, at: DateTime<Local>) -> String {
    format!(
        "{} <b>{}</b>\n\n{}\n\n<i>🕐 {}</i>",
        emoji_for(kind),
        kind.to_uppercase(),
        text,
        at.format("%H:%M:%S %d.%m.%Y")
    )
}

fn control_keyboard() -> Value {
    json!({
        "inline_keyboard": [
            [
                { "text": "📊 Status", "callback_data": "status" },
                { "text": "⏸️ Pause", "callback_data": "pause" }
            ],
            [
                { "text": "🛑 Stop", "callback_data": "stop" },
                { "text": "📋 Logs", "callback_data": "logs" }
            ]
        ]
    })
}

/// Account summary for a status message
#[derive(Debug, Clone, Default)]
pub struct AccountStatus {
    pub equity: Option<Decimal>,
    pub available: Option<Decimal>,
    pub mode: String,
    pub active_strategies: Vec<String>,
    pub last_activity: Option<String>,
}

impl AccountStatus {
    fn render(&self) -> String {
        let amount = |v: Option<Decimal>| v.map(|d| d.round_dp(2).to_string()).unwrap_or_else(|| "N/A".into());
        let strategies = if self.active_strategies.is_empty() {
            "No active strategies".to_string()
        } else {
            self.active_strategies
                .iter()
                .map(|s| format!("• {}", s))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "📊 <b>ACCOUNT STATUS</b>\n\n💰 <b>Balance:</b>\n• Equity: {} USDT\n• Available: {} USDT\n\n⚙️ <b>Mode:</b> {}\n\n🤖 <b>Active strategies:</b>\n{}\n\n📈 <b>Last activity:</b>\n{}",
            amount(self.equity),
            amount(self.available),
            self.mode,
            strategies,
            self.last_activity.as_deref().unwrap_or("No data"),
        )
    }
}

/// Sends messages to one chat. A notifier without credentials does nothing.
pub struct TelegramNotifier {
    http: reqwest::Client,
    base_url: String,
    target: Option<(String, String)>,
    trade_notifications: bool,
    error_notifications: bool,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, credentials: Option<&TelegramCredentials>) -> Self {
        let target = credentials
            .filter(|_| config.enabled)
            .map(|c| (c.bot_token.clone(), c.chat_id.clone()));
        if config.enabled && target.is_none() {
            warn!("Telegram enabled without credentials, notifications disabled");
        }
        Self {
            http: reqwest::Client::builder()
                .timeout(TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: API_URL.to_string(),
            target,
            trade_notifications: config.trade_notifications,
            error_notifications: config.error_notifications,
        }
    }

    pub fn disabled() -> Self {
        Self::new(&TelegramConfig::default(), None)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    async fn call(&self, method: &str, body: Option<Value>) -> Result<Option<Value>, NotifyError> {
        let Some((token, _)) = &self.target else {
            return Ok(None);
        };
        let url = format!("{}/bot{}/{}", self.base_url, token, method);
        let request = match body {
            Some(body) => self.http.post(&url).json(&body),
            None => self.http.get(&url),
        };
        let response: ApiResponse = request.send().await?.json().await?;
        if !response.ok {
            return Err(NotifyError::Api(
                response.description.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(response.result)
    }

    /// Bot name reported by `getMe`
    pub async fn test_connection(&self) -> Result<String, NotifyError> {
        let result = self.call("getMe", None).await?;
        Ok(result
            .as_ref()
            .and_then(|r| r["first_name"].as_str())
            .unwrap_or("Unknown")
            .to_string())
    }

    pub async fn send_message(&self, text: &str, keyboard: Option<Value>) -> Result<(), NotifyError> {
        let Some((_, chat_id)) = &self.target else {
            return Ok(());
        };
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = keyboard;
        }
        self.call("sendMessage", Some(body)).await?;
        debug!(len = text.len(), "Telegram message sent");
        Ok(())
    }

    pub async fn send_notification(
        &self,
        kind: &str,
        text: &str,
        buttons: bool,
    ) -> Result<(), NotifyError> {
        let message = format_notification(kind, text, Local::now());
        let keyboard = buttons.then(control_keyboard);
        self.send_message(&message, keyboard).await
    }

    pub async fn send_status_update(&self, status: &AccountStatus) -> Result<(), NotifyError> {
        self.send_notification("system", &status.render(), false).await
    }

    /// Trade notification; failures are logged, not returned
    pub async fn notify_trade(&self, text: &str) {
        if !self.trade_notifications {
            return;
        }
        if let Err(e) = self.send_notification("trade", text, false).await {
            warn!(error = %e, "Trade notification failed");
        }
    }

    /// Error notification; failures are logged, not returned
    pub async fn notify_error(&self, text: &str) {
        if !self.error_notifications {
            return;
        }
        if let Err(e) = self.send_notification("error", text, false).await {
            warn!(error = %e, "Error notification failed");
        }
    }

    /// Strategy lifecycle notification; failures are logged, not returned
    pub async fn notify_strategy(&self, text: &str) {
        if let Err(e) = self.send_notification("strategy", text, true).await {
            warn!(error = %e, "Strategy notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn enabled(server: &mockito::ServerGuard) -> TelegramNotifier {
        let config = TelegramConfig {
            enabled: true,
            ..TelegramConfig::default()
        };
        let creds = TelegramCredentials {
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
        };
        TelegramNotifier::new(&config, Some(&creds)).with_base_url(server.url())
    }

    #[test]
    fn test_format_notification() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let text = format_notification("trade", "Bought 0.1 BTC", at);
        assert_eq!(
            text,
            "💰 <b>TRADE</b>\n\nBought 0.1 BTC\n\n<i>🕐 14:07:09 05.03.2024</i>"
        );
        assert!(format_notification("whatever", "x", at).starts_with("📢 <b>WHATEVER</b>"));
        assert_eq!(emoji_for("System"), "⚙️");
    }

    #[test]
    fn test_status_render() {
        let status = AccountStatus {
            equity: Some(Decimal::new(123456, 2)),
            available: None,
            mode: "paper".to_string(),
            active_strategies: vec!["ma".to_string()],
            last_activity: None,
        };
        let text = status.render();
        assert!(text.contains("Equity: 1234.56 USDT"));
        assert!(text.contains("Available: N/A USDT"));
        assert!(text.contains("• ma"));
        assert!(text.contains("No data"));
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let notifier = TelegramNotifier::disabled();
        assert!(!notifier.is_enabled());
        assert!(notifier.send_notification("trade", "x", true).await.is_ok());
        assert_eq!(notifier.test_connection().await.unwrap(), "Unknown");
    }

    #[tokio::test]
    async fn test_send_message_with_keyboard() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({ "chat_id": "42", "parse_mode": "HTML" })),
                Matcher::Regex("callback_data".to_string()),
            ]))
            .with_body(r#"{"ok":true,"result":{"message_id":1}}"#)
            .create_async()
            .await;

        enabled(&server)
            .send_notification("strategy", "started", true)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_and_get_me() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_body(r#"{"ok":false,"description":"chat not found"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/bot123:abc/getMe")
            .with_body(r#"{"ok":true,"result":{"first_name":"TraderBot"}}"#)
            .create_async()
            .await;

        let notifier = enabled(&server);
        let err = notifier.send_message("hi", None).await.unwrap_err();
        assert!(matches!(err, NotifyError::Api(ref m) if m == "chat not found"));
        assert_eq!(notifier.test_connection().await.unwrap(), "TraderBot");
    }

    #[tokio::test]
    async fn test_send_status_update() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({ "chat_id": "42", "parse_mode": "HTML" })),
                Matcher::Regex("ACCOUNT STATUS".to_string()),
                Matcher::Regex(r"Equity: 250\.00 USDT".to_string()),
                Matcher::Regex("grid_eth".to_string()),
            ]))
            .with_body(r#"{"ok":true,"result":{"message_id":2}}"#)
            .expect(1)
            .create_async()
            .await;

        let status = AccountStatus {
            equity: Some(Decimal::new(25000, 2)),
            available: Some(Decimal::new(100, 0)),
            mode: "Paper".to_string(),
            active_strategies: vec!["grid_eth".to_string()],
            last_activity: None,
        };
        enabled(&server).send_status_update(&status).await.unwrap();
        mock.assert_async().await;
    }
}
