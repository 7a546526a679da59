//! Notification Throttling
//!
//! Tracks when each instrument was last notified so that at most one alert
//! per instrument goes out per cooldown window.
//!
//! Entries change only when a dispatch is actually attempted. Deciding to
//! suppress a tick reads the state and never writes it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default cooldown between alerts for the same instrument.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Per-instrument last-dispatch times.
#[derive(Debug, Clone)]
pub struct ThrottleState {
    cooldown: Duration,
    last_notified: HashMap<String, Instant>,
}

impl Default for ThrottleState {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl ThrottleState {
    /// Create an empty state with the given cooldown.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_notified: HashMap::new(),
        }
    }

    /// Configured cooldown window.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Time left in the cooldown window, or `None` if a dispatch is allowed.
    #[must_use]
    pub fn remaining(&self, instrument_id: &str, now: Instant) -> Option<Duration> {
        let last = self.last_notified.get(instrument_id)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }

    /// Whether a dispatch for this instrument should be suppressed.
    #[must_use]
    pub fn should_suppress(&self, instrument_id: &str, now: Instant) -> bool {
        self.remaining(instrument_id, now).is_some()
    }

    /// Record that a dispatch was attempted at `now`.
    pub fn record_dispatch(&mut self, instrument_id: &str, now: Instant) {
        self.last_notified.insert(instrument_id.to_string(), now);
    }

    /// When the instrument was last dispatched.
    #[must_use]
    pub fn last_notified(&self, instrument_id: &str) -> Option<Instant> {
        self.last_notified.get(instrument_id).copied()
    }
}

// =============================================================================
// Tests
// =============================================================================
