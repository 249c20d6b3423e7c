//! Outbound notifications

mod telegram;

pub use telegram::{emoji_for, format_notification, AccountStatus, NotifyError, TelegramNotifier};
