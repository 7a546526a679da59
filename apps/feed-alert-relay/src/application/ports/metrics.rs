//! Relay Metrics Port
//!
//! Counters reported by the tick path. The Prometheus adapter lives in
//! `infrastructure::metrics`.

/// Outcome of one dispatch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Alert accepted by the transport.
    Delivered,
    /// Alert skipped inside the cooldown window.
    Suppressed,
    /// Transport reported a failure.
    Failed,
}

impl NotificationOutcome {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Suppressed => "suppressed",
            Self::Failed => "failed",
        }
    }
}

/// Sink for tick and notification counters.
#[cfg_attr(test, mockall::automock)]
pub trait RelayMetrics: Send + Sync {
    /// An event was normalized into a tick.
    fn tick_accepted(&self);

    /// An event was dropped for `reason`.
    fn tick_dropped(&self, reason: &'static str);

    /// A tick was lost to a full dispatch queue.
    fn queue_overflow(&self);

    /// A dispatch decision was made.
    fn notification(&self, outcome: NotificationOutcome);
}
