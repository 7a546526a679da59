//! Throttled Notifier
//!
//! Owns the throttle state and the transport. At most one alert per
//! instrument is attempted per cooldown window; the dispatch time is
//! recorded whenever an attempt is made, whether or not delivery succeeds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::formatter::AlertFormatter;
use crate::application::ports::{
    DeliveryError, NotificationOutcome, NotificationTransport, RelayMetrics,
};
use crate::domain::market::CanonicalTick;
use crate::domain::throttle::ThrottleState;

/// Result of one notify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Inside the cooldown window.
    Suppressed {
        /// Time left in the window.
        remaining: Duration,
    },
    /// Transport accepted the alert.
    Delivered,
    /// Transport failed; logged and dropped.
    Failed(DeliveryError),
}

/// Formats, throttles and delivers alerts.
pub struct ThrottledNotifier {
    transport: Arc<dyn NotificationTransport>,
    formatter: AlertFormatter,
    throttle: ThrottleState,
    metrics: Arc<dyn RelayMetrics>,
}

impl ThrottledNotifier {
    /// Create a notifier with the given cooldown.
    #[must_use]
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        formatter: AlertFormatter,
        cooldown: Duration,
        metrics: Arc<dyn RelayMetrics>,
    ) -> Self {
        Self {
            transport,
            formatter,
            throttle: ThrottleState::new(cooldown),
            metrics,
        }
    }

    /// Current throttle state.
    #[must_use]
    pub const fn throttle(&self) -> &ThrottleState {
        &self.throttle
    }

    /// Dispatch an alert for a tick unless it is throttled.
    pub async fn notify(&mut self, tick: &CanonicalTick) -> DispatchOutcome {
        let now = tokio::time::Instant::now().into_std();
        if let Some(remaining) = self.throttle.remaining(&tick.instrument_id, now) {
            self.metrics.notification(NotificationOutcome::Suppressed);
            tracing::debug!(
                instrument_id = %tick.instrument_id,
                remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                "Throttled alert"
            );
            return DispatchOutcome::Suppressed { remaining };
        }

        let message = self.formatter.format(tick);
        self.throttle.record_dispatch(&tick.instrument_id, now);

        match self.transport.deliver(&message).await {
            Ok(()) => {
                self.metrics.notification(NotificationOutcome::Delivered);
                tracing::info!(
                    instrument_id = %tick.instrument_id,
                    price = tick.price,
                    "Alert delivered"
                );
                DispatchOutcome::Delivered
            }
            Err(e) => {
                self.metrics.notification(NotificationOutcome::Failed);
                tracing::warn!(
                    instrument_id = %tick.instrument_id,
                    error = %e,
                    "Alert delivery failed"
                );
                DispatchOutcome::Failed(e)
            }
        }
    }

    /// Drain the tick queue until it closes or shutdown is requested.
    pub async fn run(mut self, mut ticks: mpsc::Receiver<CanonicalTick>, cancel: CancellationToken) {
        tracing::info!(cooldown_secs = self.throttle.cooldown().as_secs(), "Notifier started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                tick = ticks.recv() => {
                    let Some(tick) = tick else { break };
                    let _ = self.notify(&tick).await;
                }
            }
        }
        tracing::info!("Notifier stopped");
    }
}
