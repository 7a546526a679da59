#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Feed Alert Relay - Adaptive Market Feed Integration
//!
//! Connects to a market-data streaming client whose API surface is not
//! known ahead of time, normalizes whatever tick shapes it delivers into
//! canonical `(instrument, price)` pairs, and relays throttled price alerts
//! to a Telegram chat.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Canonical ticks, latest prices, throttling, connection types
//!   - `market`: `CanonicalTick` and the `LatestPriceTable`
//!   - `throttle`: Per-instrument notification cooldown
//!   - `connection`: Version candidates, constructor mappings, supervisor states
//!
//! - **Application**: Port definitions and the integration core
//!   - `ports`: Client library capability surface, notification transport
//!   - `services`: Resolver, negotiator, prober, normalizer, notifier, supervisor
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `shim`: Capability tables and the built-in feed client shim
//!   - `telegram`: Bot API notification transport
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Resolver ──► Negotiator ──► Prober ──► client run call
//!                                             │ callback
//!                                             ▼
//!                  LatestPriceTable ◄── Normalizer ──► tick queue ──► Notifier ──► Telegram
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core tick and connection types.
pub mod domain;

/// Application layer - Ports and the adaptive integration services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{
    ConstructorMapping, KeywordMapping, SupervisorState, VERSION_CANDIDATES, VersionCandidate,
};
pub use domain::market::{CanonicalTick, LatestPriceTable, PriceObservation, SharedPriceTable};
pub use domain::throttle::ThrottleState;

// Ports
pub use application::ports::{
    AlertMessage, ArgValue, AttributeSource, CallArgs, CallError, ClientHandle, ClientLibrary,
    Constant, DeliveryError, EntryType, EventCallback, InboundEvent, InstrumentSpec,
    LibraryRegistry, ModuleHandle, NotificationOutcome, NotificationTransport, ParseMode,
    PendingCall, RelayMetrics,
};

// Services
pub use application::services::{
    AlertFormatter, CallingConvention, CapabilityBinding, CapabilityResolver, ConnectionAttempt,
    ConstructorNegotiator, DiscoveryError, DiscoveryProfile, DispatchOutcome, FeedIdentity,
    Invocation, InvocationProber, MIN_BACKOFF_DELAY, MalformedTick, MessageNormalizer,
    ModuleFallback, NegotiationError, NegotiationFailure, ProbeError, ReconnectConfig,
    ReconnectPolicy, ReconnectionSupervisor, SupervisorConfig, SupervisorError, SupervisorEvent,
    ThrottledNotifier, normalize,
};

// Infrastructure
pub use infrastructure::config::{ConfigError, RelayConfig};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::metrics::{PrometheusMetrics, init_metrics};
pub use infrastructure::shim::{
    BoundArgs, EntryTable, HandleTable, LibraryTable, ModuleTable, Parameter, Signature,
    builtin_registry,
};
pub use infrastructure::status::{RelayStatus, handle_supervisor_events};
pub use infrastructure::telegram::{TelegramConfig, TelegramTransport};
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
