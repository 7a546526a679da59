//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.

use std::collections::HashMap;
use std::time::Duration;

use crate::application::services::{
    FeedIdentity, MIN_BACKOFF_DELAY, ReconnectConfig, SupervisorConfig,
};
use crate::infrastructure::telegram::{DEFAULT_API_BASE, TelegramConfig};

const DEFAULT_PACKAGE: &str = "dhanhq";
const DEFAULT_WS_URL: &str = "wss://api-feed.dhan.co";
const DEFAULT_INSTRUMENTS: &str = "1333";
const DEFAULT_LABELS: &str = "1333=HDFC BANK";

/// Feed credentials.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    access_token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(client_id: String, access_token: String) -> Self {
        Self {
            client_id,
            access_token,
        }
    }

    /// Get the client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Which client package to drive and what to subscribe.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Client package name.
    pub package: String,
    /// WebSocket endpoint used by the built-in shim.
    pub ws_url: String,
    /// Security ids to subscribe.
    pub instruments: Vec<String>,
    /// Display labels keyed by security id.
    pub labels: HashMap<String, String>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            package: DEFAULT_PACKAGE.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            instruments: parse_list(DEFAULT_INSTRUMENTS),
            labels: parse_labels(DEFAULT_LABELS),
        }
    }
}

/// Reconnection timings.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Backoff policy between failed attempts.
    pub backoff: ReconnectConfig,
    /// Pause after a stream ends.
    pub settle_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            backoff: ReconnectConfig::default(),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Feed credentials.
    pub credentials: Credentials,
    /// Feed package and instruments.
    pub feed: FeedSettings,
    /// Reconnection timings.
    pub retry: RetrySettings,
    /// Per-instrument alert cooldown.
    pub send_interval: Duration,
    /// Capacity of the tick dispatch queue.
    pub tick_queue_capacity: usize,
    /// Telegram delivery settings.
    pub telegram: TelegramConfig,
    /// Health server port (0 = disabled).
    pub health_port: u16,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required keys are missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let client_id = required(&lookup, "DHAN_CLIENT_ID")?;
        let access_token = required(&lookup, "DHAN_ACCESS_TOKEN")?;
        let bot_token = required(&lookup, "TELEGRAM_BOT_TOKEN")?;
        let chat_id = required(&lookup, "TELEGRAM_CHAT_ID")?;

        let defaults = FeedSettings::default();
        let mut instruments = lookup("ALERT_INSTRUMENTS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();
        if instruments.is_empty() {
            instruments = defaults.instruments;
        }
        let feed = FeedSettings {
            package: lookup("FEED_PACKAGE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.package),
            ws_url: lookup("FEED_WS_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.ws_url),
            instruments,
            labels: lookup("ALERT_INSTRUMENT_LABELS").map_or(defaults.labels, |v| parse_labels(&v)),
        };

        let backoff_defaults = ReconnectConfig::default();
        let retry = RetrySettings {
            backoff: ReconnectConfig {
                initial_delay: parse_duration_secs(
                    &lookup,
                    "RECONNECT_INITIAL_BACKOFF_SECS",
                    backoff_defaults.initial_delay,
                )
                .max(MIN_BACKOFF_DELAY),
                max_delay: parse_duration_secs(
                    &lookup,
                    "RECONNECT_MAX_BACKOFF_SECS",
                    backoff_defaults.max_delay,
                )
                .max(MIN_BACKOFF_DELAY),
                multiplier: parse_or(
                    &lookup,
                    "RECONNECT_BACKOFF_MULTIPLIER",
                    backoff_defaults.multiplier,
                ),
                jitter_factor: parse_or(
                    &lookup,
                    "RECONNECT_JITTER_FACTOR",
                    backoff_defaults.jitter_factor,
                )
                .clamp(0.0, 1.0),
                max_attempts: parse_or(
                    &lookup,
                    "RECONNECT_MAX_ATTEMPTS",
                    backoff_defaults.max_attempts,
                ),
            },
            settle_delay: parse_duration_millis(
                &lookup,
                "STREAM_SETTLE_MILLIS",
                RetrySettings::default().settle_delay,
            ),
        };

        let telegram = TelegramConfig::new(bot_token, chat_id)
            .with_api_base(
                lookup("TELEGRAM_API_BASE")
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            )
            .with_timeout(parse_duration_secs(
                &lookup,
                "TELEGRAM_TIMEOUT_SECS",
                Duration::from_secs(8),
            ));

        Ok(Self {
            credentials: Credentials::new(client_id, access_token),
            feed,
            retry,
            send_interval: parse_duration_secs(&lookup, "SEND_INTERVAL_SECONDS", Duration::from_secs(60)),
            tick_queue_capacity: parse_or(&lookup, "TICK_QUEUE_CAPACITY", 1024_usize).max(1),
            telegram,
            health_port: parse_or(&lookup, "RELAY_HEALTH_PORT", 8083),
        })
    }

    /// Identity handed to the client constructor.
    #[must_use]
    pub fn identity(&self) -> FeedIdentity {
        FeedIdentity::new(
            self.credentials.client_id().to_string(),
            self.credentials.access_token().to_string(),
            self.feed.instruments.clone(),
        )
    }

    /// Supervisor configuration derived from these settings.
    #[must_use]
    pub fn supervisor(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig::new(self.feed.package.clone(), self.identity());
        config.backoff = self.retry.backoff.clone();
        config.settle_delay = self.retry.settle_delay;
        config
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value.to_string())
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// `id=label` pairs separated by commas; malformed entries are skipped.
fn parse_labels(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|entry| entry.split_once('='))
        .map(|(id, label)| (id.trim(), label.trim()))
        .filter(|(id, label)| !id.is_empty() && !label.is_empty())
        .map(|(id, label)| (id.to_string(), label.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::ReconnectPolicy;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("DHAN_CLIENT_ID", "1000"),
        ("DHAN_ACCESS_TOKEN", "token"),
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("TELEGRAM_CHAT_ID", "-100"),
    ];

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let config = RelayConfig::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.feed.package, "dhanhq");
        assert_eq!(config.feed.ws_url, "wss://api-feed.dhan.co");
        assert_eq!(config.feed.instruments, vec!["1333".to_string()]);
        assert_eq!(config.feed.labels.get("1333").map(String::as_str), Some("HDFC BANK"));
        assert_eq!(config.send_interval, Duration::from_secs(60));
        assert_eq!(config.retry.backoff.initial_delay, Duration::from_secs(1));
        assert_eq!(config.retry.backoff.max_delay, Duration::from_secs(60));
        assert_eq!(config.retry.backoff.max_attempts, 0);
        assert_eq!(config.retry.settle_delay, Duration::from_secs(1));
        assert_eq!(config.tick_queue_capacity, 1024);
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert_eq!(config.telegram.timeout, Duration::from_secs(8));
        assert_eq!(config.health_port, 8083);
    }

    #[test]
    fn missing_required_key_is_reported() {
        let err = RelayConfig::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "TELEGRAM_CHAT_ID"));
    }

    #[test]
    fn blank_required_key_is_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs[1] = ("DHAN_ACCESS_TOKEN", "  ");
        let err = RelayConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "DHAN_ACCESS_TOKEN"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("ALERT_INSTRUMENTS", " 1333, 11536 ,,"),
            ("ALERT_INSTRUMENT_LABELS", "1333=HDFC BANK,11536=TCS,broken"),
            ("SEND_INTERVAL_SECONDS", "15"),
            ("RECONNECT_MAX_BACKOFF_SECS", "30"),
            ("RECONNECT_JITTER_FACTOR", "4"),
            ("STREAM_SETTLE_MILLIS", "250"),
            ("TELEGRAM_API_BASE", "http://127.0.0.1:9000/"),
            ("RELAY_HEALTH_PORT", "0"),
        ]);
        let config = RelayConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.feed.instruments, vec!["1333".to_string(), "11536".to_string()]);
        assert_eq!(config.feed.labels.len(), 2);
        assert_eq!(config.send_interval, Duration::from_secs(15));
        assert_eq!(config.retry.backoff.max_delay, Duration::from_secs(30));
        assert!((config.retry.backoff.jitter_factor - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.retry.settle_delay, Duration::from_millis(250));
        assert_eq!(config.telegram.api_base, "http://127.0.0.1:9000");
        assert_eq!(config.health_port, 0);
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("SEND_INTERVAL_SECONDS", "soon"), ("TICK_QUEUE_CAPACITY", "0")]);
        let config = RelayConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.send_interval, Duration::from_secs(60));
        assert_eq!(config.tick_queue_capacity, 1);
    }

    #[test]
    fn zero_backoff_is_raised_to_minimum() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("RECONNECT_INITIAL_BACKOFF_SECS", "0"),
            ("RECONNECT_MAX_BACKOFF_SECS", "0"),
        ]);
        let config = RelayConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.retry.backoff.initial_delay, Duration::from_millis(1));
        assert_eq!(config.retry.backoff.max_delay, Duration::from_millis(1));

        let mut policy = ReconnectPolicy::new(config.retry.backoff);
        assert!(policy.next_delay().is_some_and(|delay| !delay.is_zero()));
    }

    #[test]
    fn supervisor_config_carries_identity_and_timings() {
        let config = RelayConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        let supervisor = config.supervisor();
        assert_eq!(supervisor.package, "dhanhq");
        assert_eq!(supervisor.identity.client_id, "1000");
        assert_eq!(supervisor.identity.security_ids, vec!["1333".to_string()]);
        assert_eq!(supervisor.settle_delay, Duration::from_secs(1));
    }

    #[test]
    fn credentials_redacted_debug() {
        let config = RelayConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("\"token\""));
        assert!(!debug.contains("123:abc"));
        assert!(debug.contains("[REDACTED]"));
    }
}
