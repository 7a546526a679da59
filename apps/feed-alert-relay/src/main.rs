//! Feed Alert Relay Binary
//!
//! Connects to the configured market-feed client and relays throttled
//! price alerts to Telegram.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin feed-alert-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DHAN_CLIENT_ID`: Feed client id
//! - `DHAN_ACCESS_TOKEN`: Feed access token
//! - `TELEGRAM_BOT_TOKEN`: Bot API token
//! - `TELEGRAM_CHAT_ID`: Destination chat
//!
//! ## Optional
//! - `FEED_PACKAGE`: Client package to load (default: dhanhq)
//! - `FEED_WS_URL`: Feed WebSocket endpoint (default: wss://api-feed.dhan.co)
//! - `ALERT_INSTRUMENTS`: Comma-separated security ids (default: 1333)
//! - `ALERT_INSTRUMENT_LABELS`: `id=label` pairs (default: 1333=HDFC BANK)
//! - `SEND_INTERVAL_SECONDS`: Per-instrument alert cooldown (default: 60)
//! - `RECONNECT_*`: Backoff tuning (1s initial, 60s max, x2, no jitter, unlimited)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: feed_alert_relay=info)

use std::sync::Arc;

use feed_alert_relay::infrastructure::health::{HealthServer, HealthServerState};
use feed_alert_relay::infrastructure::telemetry;
use feed_alert_relay::{
    AlertFormatter, CapabilityResolver, LatestPriceTable, MessageNormalizer, PrometheusMetrics,
    ReconnectionSupervisor, RelayConfig, RelayMetrics, RelayStatus, TelegramTransport,
    ThrottledNotifier, builtin_registry, handle_supervisor_events, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the supervisor event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    load_dotenv();

    let telemetry_guard = telemetry::init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        otel = telemetry_guard.is_exporting(),
        "Starting Feed Alert Relay"
    );

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable; metrics disabled");
    }

    // Fatal errors propagate out of main and are printed once by the runtime
    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Tick path: feed callback -> normalizer -> queue -> notifier
    let prices = Arc::new(LatestPriceTable::new());
    let (tick_tx, tick_rx) = mpsc::channel(config.tick_queue_capacity);
    let metrics: Arc<dyn RelayMetrics> = Arc::new(PrometheusMetrics);
    let normalizer = MessageNormalizer::new(Arc::clone(&prices), tick_tx, Arc::clone(&metrics));

    let transport = Arc::new(TelegramTransport::new(config.telegram.clone())?);
    let formatter = AlertFormatter::new(config.feed.labels.clone(), config.send_interval);
    let notifier = ThrottledNotifier::new(transport, formatter, config.send_interval, metrics);
    let notifier_task = tokio::spawn(notifier.run(tick_rx, shutdown_token.clone()));

    // Supervisor events -> status + metrics
    let status = Arc::new(RelayStatus::new());
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(handle_supervisor_events(event_rx, Arc::clone(&status)));

    if config.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&status),
            Arc::clone(&prices),
        ));
        let health_server =
            HealthServer::new(config.health_port, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let resolver = CapabilityResolver::new(builtin_registry(config.feed.ws_url.clone()));
    let supervisor = ReconnectionSupervisor::new(
        resolver,
        config.supervisor(),
        normalizer.callback(),
        event_tx,
        shutdown_token.clone(),
    );

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    tracing::info!("Feed alert relay ready");

    let outcome = supervisor.run().await;

    // Stop the notifier and health server whichever way the supervisor ended
    shutdown_token.cancel();
    if let Err(e) = notifier_task.await {
        tracing::warn!(error = %e, "Notifier task failed");
    }

    outcome?;
    tracing::info!("Feed alert relay stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        package = %config.feed.package,
        instruments = ?config.feed.instruments,
        send_interval_secs = config.send_interval.as_secs(),
        health_port = config.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        ws_url = %config.feed.ws_url,
        backoff = ?config.retry.backoff,
        telegram = ?config.telegram,
        "Connection settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
