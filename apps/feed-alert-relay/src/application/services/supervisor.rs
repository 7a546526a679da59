//! Reconnection Supervisor
//!
//! Drives one connection attempt at a time through discovery, constructor
//! negotiation, run-method probing and streaming, backing off between
//! failed attempts.
//!
//! # State Machine
//!
//! ```text
//! Idle ─► Discovering ─► Negotiating ─► Probing ─► Streaming
//!             │               │            │           │
//!             │ fatal         └──► BackingOff ◄──┘     │ returned / raised
//!             ▼                       │                ▼
//!         Terminated        Negotiating / Discovering  Negotiating (backoff reset)
//! ```
//!
//! Discovery failures terminate without backing off. Shutdown moves any
//! state to `Terminated`, which is absorbing.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::negotiator::{ConstructorNegotiator, FeedIdentity};
use super::prober::{InvocationProber, ModuleFallback};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::resolver::{CapabilityBinding, CapabilityResolver, DiscoveryError};
use crate::application::ports::EventCallback;
use crate::domain::connection::{ConstructorMapping, SupervisorState, VersionCandidate};

// =============================================================================
// Configuration
// =============================================================================

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Client package to load.
    pub package: String,
    /// Credentials and instruments.
    pub identity: FeedIdentity,
    /// Backoff between failed attempts.
    pub backoff: ReconnectConfig,
    /// Pause after a stream ends before reconnecting.
    pub settle_delay: Duration,
    /// Upper bound on a close call.
    pub release_timeout: Duration,
}

impl SupervisorConfig {
    /// Configuration with default timings.
    #[must_use]
    pub fn new(package: impl Into<String>, identity: FeedIdentity) -> Self {
        Self {
            package: package.into(),
            identity,
            backoff: ReconnectConfig::default(),
            settle_delay: Duration::from_secs(1),
            release_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Lifecycle notifications emitted while supervising.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// The supervisor moved to a new state.
    StateChanged(SupervisorState),
    /// A negotiation round began.
    AttemptStarted,
    /// A constructor call produced a handle.
    Connected {
        /// Attempt identifier.
        attempt_id: Uuid,
        /// Version accepted.
        version: VersionCandidate,
        /// Call shape accepted.
        mapping: ConstructorMapping,
    },
    /// A run method was invoked.
    Streaming {
        /// Attempt identifier.
        attempt_id: Uuid,
        /// Method invoked.
        method: String,
    },
    /// The run call returned or raised.
    StreamEnded {
        /// Attempt identifier.
        attempt_id: Uuid,
        /// Error raised, if any.
        error: Option<String>,
    },
    /// An attempt failed before streaming.
    AttemptFailed {
        /// Failure kind label.
        kind: &'static str,
        /// Failure description.
        error: String,
    },
    /// A backoff delay was scheduled.
    BackingOff {
        /// Delay before the next attempt.
        delay: Duration,
        /// Consecutive failed attempts.
        attempt: u32,
    },
}

// =============================================================================
// Errors
// =============================================================================

/// Terminal supervisor failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    /// The client entry type could not be discovered.
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The configured attempt limit was reached.
    #[error("gave up after {attempts} consecutive failed attempts")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

// =============================================================================
// Supervisor
// =============================================================================

/// Runs the connection lifecycle until shutdown or a fatal failure.
pub struct ReconnectionSupervisor {
    resolver: CapabilityResolver,
    negotiator: ConstructorNegotiator,
    prober: InvocationProber,
    callback: EventCallback,
    config: SupervisorConfig,
    events: mpsc::Sender<SupervisorEvent>,
    cancel: CancellationToken,
    state: SupervisorState,
}

impl ReconnectionSupervisor {
    /// Create a supervisor.
    ///
    /// `callback` receives every inbound event of every stream.
    #[must_use]
    pub fn new(
        resolver: CapabilityResolver,
        config: SupervisorConfig,
        callback: EventCallback,
        events: mpsc::Sender<SupervisorEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            resolver,
            negotiator: ConstructorNegotiator::new(config.identity.clone()),
            prober: InvocationProber::new(),
            callback,
            config,
            events,
            cancel,
            state: SupervisorState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    /// Run until shutdown.
    ///
    /// # Errors
    ///
    /// `Discovery` if the entry type cannot be found, `RetriesExhausted`
    /// if the backoff attempt limit is reached.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let mut policy = ReconnectPolicy::new(self.config.backoff.clone());
        let mut binding: Option<CapabilityBinding> = None;

        tracing::info!(
            package = %self.config.package,
            instruments = ?self.config.identity.security_ids,
            "Supervisor starting"
        );

        while !self.cancel.is_cancelled() {
            let current = if let Some(current) = &binding {
                current.clone()
            } else {
                self.transition(SupervisorState::Discovering).await;
                match self.resolver.resolve(&self.config.package) {
                    Ok(resolved) => binding.insert(resolved).clone(),
                    Err(e) => {
                        tracing::error!(diagnostic = %e.diagnostic(), "Feed discovery failed");
                        self.transition(SupervisorState::Terminated).await;
                        return Err(e.into());
                    }
                }
            };

            self.transition(SupervisorState::Negotiating).await;
            self.emit(SupervisorEvent::AttemptStarted).await;
            let attempt = match self.negotiator.negotiate(&current) {
                Ok(attempt) => attempt,
                Err(e) => {
                    for failure in e.failures() {
                        tracing::debug!(%failure, "Constructor call failed");
                    }
                    tracing::warn!(error = %e, "Could not construct feed client");
                    self.emit(SupervisorEvent::AttemptFailed {
                        kind: "negotiation_exhausted",
                        error: e.to_string(),
                    })
                    .await;
                    if !self.back_off(&mut policy).await? {
                        break;
                    }
                    continue;
                }
            };
            self.emit(SupervisorEvent::Connected {
                attempt_id: attempt.id,
                version: attempt.version,
                mapping: attempt.mapping,
            })
            .await;

            self.transition(SupervisorState::Probing).await;
            let fallback = ModuleFallback {
                module: current.module.as_ref(),
                leading: self.config.identity.positional_args(&current),
            };
            let invocation = match self.prober.probe_with_module(
                attempt.handle.as_ref(),
                Some(&fallback),
                &self.callback,
            ) {
                Ok(invocation) => invocation,
                Err(e) => {
                    tracing::error!(
                        attempt_id = %attempt.id,
                        error = %e,
                        members = ?attempt.handle.member_names(),
                        "No runnable entry point on feed client"
                    );
                    self.emit(SupervisorEvent::AttemptFailed {
                        kind: "no_runnable_entry_point",
                        error: e.to_string(),
                    })
                    .await;
                    attempt.release(self.config.release_timeout).await;
                    binding = None;
                    if !self.back_off(&mut policy).await? {
                        break;
                    }
                    continue;
                }
            };

            self.transition(SupervisorState::Streaming).await;
            self.emit(SupervisorEvent::Streaming {
                attempt_id: attempt.id,
                method: invocation.method.clone(),
            })
            .await;

            let outcome = tokio::select! {
                result = invocation.call => Some(result),
                () = self.cancel.cancelled() => None,
            };
            attempt.release(self.config.release_timeout).await;

            let Some(result) = outcome else {
                break;
            };
            match &result {
                Ok(()) => tracing::info!(attempt_id = %attempt.id, "Stream ended; reconnecting"),
                Err(e) => tracing::warn!(attempt_id = %attempt.id, error = %e, "Stream raised; reconnecting"),
            }
            self.emit(SupervisorEvent::StreamEnded {
                attempt_id: attempt.id,
                error: result.err().map(|e| e.to_string()),
            })
            .await;
            policy.reset();

            if !self.pause(self.config.settle_delay).await {
                break;
            }
        }

        self.transition(SupervisorState::Terminated).await;
        tracing::info!("Supervisor stopped");
        Ok(())
    }

    /// Sleep the next backoff delay. Returns `false` on shutdown.
    async fn back_off(&mut self, policy: &mut ReconnectPolicy) -> Result<bool, SupervisorError> {
        let Some(delay) = policy.next_delay() else {
            self.transition(SupervisorState::Terminated).await;
            return Err(SupervisorError::RetriesExhausted {
                attempts: policy.attempt_count(),
            });
        };

        self.transition(SupervisorState::BackingOff).await;
        self.emit(SupervisorEvent::BackingOff {
            delay,
            attempt: policy.attempt_count(),
        })
        .await;
        tracing::info!(delay_secs = delay.as_secs_f64(), "Reconnecting after backoff");
        Ok(self.pause(delay).await)
    }

    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = self.cancel.cancelled() => false,
        }
    }

    async fn transition(&mut self, next: SupervisorState) {
        if self.state == next || self.state == SupervisorState::Terminated {
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "Supervisor state change");
        self.state = next;
        self.emit(SupervisorEvent::StateChanged(next)).await;
    }

    async fn emit(&self, event: SupervisorEvent) {
        let _ = self.events.send(event).await;
    }
}
