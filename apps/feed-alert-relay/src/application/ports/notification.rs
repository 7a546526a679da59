//! Notification Transport Port

use async_trait::async_trait;

/// Markup dialect of an alert body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Telegram `MarkdownV2`.
    #[default]
    MarkdownV2,
    /// Plain text.
    Plain,
}

impl ParseMode {
    /// Wire name, or `None` for plain text.
    #[must_use]
    pub const fn as_wire(&self) -> Option<&'static str> {
        match self {
            Self::MarkdownV2 => Some("MarkdownV2"),
            Self::Plain => None,
        }
    }
}

/// A formatted alert ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    /// Instrument the alert is about.
    pub instrument_id: String,
    /// Rendered body.
    pub text: String,
    /// Markup dialect of `text`.
    pub parse_mode: ParseMode,
}

/// Alert delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Request never completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Endpoint answered with a non-success status.
    #[error("rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
}

/// Outbound alert delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Deliver one alert.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the alert was not accepted.
    async fn deliver(&self, message: &AlertMessage) -> Result<(), DeliveryError>;
}
