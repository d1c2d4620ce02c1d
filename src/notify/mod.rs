//! Notification dispatch.
//!
//! The scheduler dedups before calling `send`; the sink itself is
//! idempotence-unaware. `TelegramNotifier` posts through the Bot API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{KanbotError, Result};

/// Default request timeout for Telegram API calls.
const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(15);

/// Where reminders go.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one rendered message to a chat.
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Telegram Bot API notification sink.
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url("https://api.telegram.org", token)
    }

    /// Override the API host, for tests.
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(TELEGRAM_TIMEOUT)
            .build()
            .map_err(|e| KanbotError::Dispatch(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "MarkdownV2",
            "link_preview_options": { "is_disabled": true }
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| KanbotError::Dispatch(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(KanbotError::Dispatch(format!(
                "Telegram API error {status}: {error_body}"
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("base_url", &self.base_url)
            .finish()
    }
}
