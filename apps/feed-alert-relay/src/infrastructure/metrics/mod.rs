//! Prometheus Metrics Module
//!
//! # Metrics Categories
//!
//! - **Ticks**: Events normalized, dropped by reason, queue overflow
//! - **Notifications**: Alerts delivered, suppressed, failed
//! - **Connection**: Attempts, failures by kind, backoff delays, streams ended
//! - **Supervisor**: Current lifecycle state
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::ports::{NotificationOutcome, RelayMetrics};
use crate::domain::connection::SupervisorState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the one already installed.
///
/// # Errors
///
/// Returns `BuildError` if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Prometheus handle for rendering, if metrics were initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "feed_relay_ticks_accepted_total",
        "Inbound events normalized into ticks"
    );
    describe_counter!(
        "feed_relay_ticks_dropped_total",
        "Inbound events dropped, by reason"
    );
    describe_counter!(
        "feed_relay_tick_queue_overflow_total",
        "Ticks dropped because the dispatch queue was full"
    );

    describe_counter!(
        "feed_relay_notifications_total",
        "Alert dispatch decisions, by outcome"
    );

    describe_counter!(
        "feed_relay_connection_attempts_total",
        "Connection attempts started"
    );
    describe_counter!(
        "feed_relay_attempt_failures_total",
        "Connection attempts that failed, by kind"
    );
    describe_counter!(
        "feed_relay_streams_ended_total",
        "Run calls that returned or raised"
    );
    describe_histogram!(
        "feed_relay_backoff_seconds",
        "Backoff delays scheduled between attempts"
    );

    describe_gauge!(
        "feed_relay_supervisor_state",
        "Supervisor state (0 idle .. 6 terminated)"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a normalized tick.
pub fn record_tick_accepted() {
    counter!("feed_relay_ticks_accepted_total").increment(1);
}

/// Record a dropped event.
pub fn record_tick_dropped(reason: &'static str) {
    counter!("feed_relay_ticks_dropped_total", "reason" => reason).increment(1);
}

/// Record a tick lost to a full dispatch queue.
pub fn record_queue_overflow() {
    counter!("feed_relay_tick_queue_overflow_total").increment(1);
}

/// Record a dispatch decision.
pub fn record_notification(outcome: NotificationOutcome) {
    counter!("feed_relay_notifications_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record the start of a connection attempt.
pub fn record_attempt() {
    counter!("feed_relay_connection_attempts_total").increment(1);
}

/// Record a failed attempt.
pub fn record_attempt_failure(kind: &'static str) {
    counter!("feed_relay_attempt_failures_total", "kind" => kind).increment(1);
}

/// Record a run call that ended.
pub fn record_stream_ended(clean: bool) {
    counter!(
        "feed_relay_streams_ended_total",
        "clean" => if clean { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a scheduled backoff delay.
pub fn record_backoff(delay: Duration) {
    histogram!("feed_relay_backoff_seconds").record(delay.as_secs_f64());
}

/// Publish the current supervisor state.
pub fn set_supervisor_state(state: SupervisorState) {
    gauge!("feed_relay_supervisor_state").set(state.gauge_value());
}

// =============================================================================
// Port Adapter
// =============================================================================

/// `RelayMetrics` backed by the global Prometheus recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl RelayMetrics for PrometheusMetrics {
    fn tick_accepted(&self) {
        record_tick_accepted();
    }

    fn tick_dropped(&self, reason: &'static str) {
        record_tick_dropped(reason);
    }

    fn queue_overflow(&self) {
        record_queue_overflow();
    }

    fn notification(&self, outcome: NotificationOutcome) {
        record_notification(outcome);
    }
}
