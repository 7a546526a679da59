//! Alert Formatting
//!
//! Renders a tick as a Telegram `MarkdownV2` alert. Every dynamic fragment
//! is escaped; only the surrounding markup is literal.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use chrono::TimeDelta;

use crate::application::ports::{AlertMessage, ParseMode};
use crate::domain::market::CanonicalTick;

/// Characters reserved by `MarkdownV2`.
const MARKDOWN_V2_RESERVED: &str = "_*[]()~`>#+-=|{}.!\\";

/// Offset of India Standard Time from UTC.
const IST_OFFSET_MINUTES: i64 = 330;

/// Escape text for `MarkdownV2`.
#[must_use]
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        if MARKDOWN_V2_RESERVED.contains(ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Builds alert messages.
#[derive(Debug, Clone, Default)]
pub struct AlertFormatter {
    labels: HashMap<String, String>,
    cooldown: Duration,
}

impl AlertFormatter {
    /// Formatter with per-instrument display labels.
    #[must_use]
    pub const fn new(labels: HashMap<String, String>, cooldown: Duration) -> Self {
        Self { labels, cooldown }
    }

    /// Display label for an instrument.
    #[must_use]
    pub fn label(&self, instrument_id: &str) -> String {
        self.labels
            .get(instrument_id)
            .cloned()
            .unwrap_or_else(|| format!("Security {instrument_id}"))
    }

    /// Render the alert for a tick.
    #[must_use]
    pub fn format(&self, tick: &CanonicalTick) -> AlertMessage {
        let label = self.label(&tick.instrument_id);
        let local = tick.observed_at + TimeDelta::minutes(IST_OFFSET_MINUTES);
        let time = local.format("%H:%M:%S IST").to_string();
        let price = format!("{:.2}", tick.price);
        let footer = format!(
            "This alert is based on live WebSocket data and repeats at most every {} seconds.",
            self.cooldown.as_secs()
        );

        let mut text = String::new();
        let _ = writeln!(text, "*{}* 🔔", escape_markdown(&format!("{label} LTP ALERT!")));
        let _ = writeln!(text, "Time: {}", escape_markdown(&time));
        text.push('\n');
        let _ = writeln!(text, "*{}*", escape_markdown(&label));
        let _ = writeln!(text, "Latest LTP: ₹ *{}*", escape_markdown(&price));
        text.push('\n');
        let _ = write!(text, "_{}_", escape_markdown(&footer));

        AlertMessage {
            instrument_id: tick.instrument_id.clone(),
            text,
            parse_mode: ParseMode::MarkdownV2,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn formatter() -> AlertFormatter {
        AlertFormatter::new(
            HashMap::from([("1333".to_string(), "HDFC BANK".to_string())]),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn reserved_characters_are_escaped() {
        assert_eq!(escape_markdown("1642.55"), "1642\\.55");
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("(x)!"), "\\(x\\)\\!");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn alert_uses_label_price_and_ist_time() {
        let observed = Utc.with_ymd_and_hms(2024, 5, 2, 4, 0, 5).unwrap();
        let tick = CanonicalTick::observed("1333", 1642.5, observed);
        let message = formatter().format(&tick);

        assert_eq!(message.parse_mode, ParseMode::MarkdownV2);
        assert!(message.text.starts_with("*HDFC BANK LTP ALERT\\!* 🔔\n"));
        assert!(message.text.contains("Time: 09:30:05 IST"));
        assert!(message.text.contains("₹ *1642\\.50*"));
        assert!(message.text.contains("every 60 seconds\\."));
    }

    #[test]
    fn unknown_instruments_get_generic_label() {
        let message = formatter().format(&CanonicalTick::new("11536", 10.0));
        assert!(message.text.contains("*Security 11536*"));
    }
}
