//! Relay Status
//!
//! Live view of the supervisor for the health endpoint, folded from
//! `SupervisorEvent`s by a dedicated task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::application::services::SupervisorEvent;
use crate::domain::connection::SupervisorState;
use crate::infrastructure::metrics;

/// Shared supervisor status.
#[derive(Debug)]
pub struct RelayStatus {
    state: RwLock<SupervisorState>,
    last_error: RwLock<Option<String>>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    stream_method: RwLock<Option<String>>,
    attempts: AtomicU64,
    consecutive_failures: AtomicU32,
    streams_ended: AtomicU64,
    started_at: Instant,
}

impl Default for RelayStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStatus {
    /// Fresh status in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SupervisorState::Idle),
            last_error: RwLock::new(None),
            last_connected_at: RwLock::new(None),
            stream_method: RwLock::new(None),
            attempts: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            streams_ended: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Apply one supervisor event.
    pub fn apply(&self, event: &SupervisorEvent) {
        match event {
            SupervisorEvent::StateChanged(state) => {
                *self.state.write() = *state;
                metrics::set_supervisor_state(*state);
            }
            SupervisorEvent::AttemptStarted => {
                self.attempts.fetch_add(1, Ordering::Relaxed);
                metrics::record_attempt();
            }
            SupervisorEvent::Connected { .. } => {
                *self.last_connected_at.write() = Some(Utc::now());
            }
            SupervisorEvent::Streaming { method, .. } => {
                *self.stream_method.write() = Some(method.clone());
                *self.last_error.write() = None;
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            SupervisorEvent::StreamEnded { error, .. } => {
                self.streams_ended.fetch_add(1, Ordering::Relaxed);
                metrics::record_stream_ended(error.is_none());
                if let Some(error) = error {
                    *self.last_error.write() = Some(error.clone());
                }
            }
            SupervisorEvent::AttemptFailed { kind, error } => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_attempt_failure(*kind);
                *self.last_error.write() = Some(format!("{kind}: {error}"));
            }
            SupervisorEvent::BackingOff { delay, .. } => {
                metrics::record_backoff(*delay);
            }
        }
    }

    /// Current supervisor state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.read()
    }

    /// Whether a run call is in flight.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state().is_streaming()
    }

    /// Most recent failure description.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// When a constructor last succeeded.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    /// Run method of the current or last stream.
    #[must_use]
    pub fn stream_method(&self) -> Option<String> {
        self.stream_method.read().clone()
    }

    /// Negotiation rounds started.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Failed attempts since the last successful stream.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Run calls that returned or raised.
    #[must_use]
    pub fn streams_ended(&self) -> u64 {
        self.streams_ended.load(Ordering::Relaxed)
    }

    /// Seconds since start.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Fold supervisor events into `status` until the channel closes.
pub async fn handle_supervisor_events(
    mut rx: mpsc::Receiver<SupervisorEvent>,
    status: Arc<RelayStatus>,
) {
    while let Some(event) = rx.recv().await {
        match &event {
            SupervisorEvent::Connected {
                attempt_id,
                version,
                mapping,
            } => tracing::info!(%attempt_id, %version, %mapping, "Feed client constructed"),
            SupervisorEvent::Streaming { attempt_id, method } => {
                tracing::info!(%attempt_id, method = %method, "Feed streaming");
            }
            SupervisorEvent::BackingOff { delay, attempt } => {
                tracing::debug!(attempt, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "Backoff scheduled");
            }
            _ => {}
        }
        status.apply(&event);
    }
}
