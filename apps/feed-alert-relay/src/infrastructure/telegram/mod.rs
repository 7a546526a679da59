//! Telegram Bot API Transport
//!
//! Delivers alerts through `sendMessage`. Any 2xx response counts as
//! delivered; everything else surfaces as a `DeliveryError` so the notifier
//! can log it and move on.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::application::ports::{AlertMessage, DeliveryError, NotificationTransport};

/// Default Bot API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram connection settings.
#[derive(Clone)]
pub struct TelegramConfig {
    /// API base URL, without trailing slash.
    pub api_base: String,
    /// Bot token.
    pub bot_token: String,
    /// Destination chat.
    pub chat_id: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl TelegramConfig {
    /// Settings against the public Bot API.
    #[must_use]
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            timeout: Duration::from_secs(8),
        }
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

/// `NotificationTransport` backed by the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramTransport {
    client: Client,
    config: TelegramConfig,
}

impl TelegramTransport {
    /// Build a transport.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Transport` if the HTTP client cannot be built.
    pub fn new(config: TelegramConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl NotificationTransport for TelegramTransport {
    async fn deliver(&self, message: &AlertMessage) -> Result<(), DeliveryError> {
        let body = SendMessage {
            chat_id: &self.config.chat_id,
            text: &message.text,
            parse_mode: message.parse_mode.as_wire(),
        };

        let response = self
            .client
            .post(self.config.send_message_url())
            .json(&body)
            .send()
            .await
            // reqwest errors embed the URL, which carries the bot token
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), body = %body, "Telegram rejected alert");
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
