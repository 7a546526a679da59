//! Application Services
//!
//! The adaptive integration core.
//!
//! - `CapabilityResolver`: Finds the feed entry type in a client package
//! - `ConstructorNegotiator`: Finds a constructor call the entry accepts
//! - `InvocationProber`: Starts the stream with the message callback
//! - `MessageNormalizer`: Turns arbitrary events into canonical ticks
//! - `ThrottledNotifier`: Sends at most one alert per instrument per window
//! - `ReconnectionSupervisor`: Owns the connection lifecycle

mod formatter;
mod negotiator;
mod normalizer;
mod notifier;
mod prober;
mod reconnect;
mod resolver;
mod supervisor;

pub use formatter::{AlertFormatter, escape_markdown};
pub use negotiator::{
    ConnectionAttempt, ConstructorNegotiator, FeedIdentity, KEYWORD_MAPPINGS, NegotiationError,
    NegotiationFailure, VERSION_KEYWORDS,
};
pub use normalizer::{
    INSTRUMENT_KEYS, MalformedTick, MessageNormalizer, NESTED_KEYS, PRICE_KEYS, normalize,
};
pub use notifier::{DispatchOutcome, ThrottledNotifier};
pub use prober::{
    CALLBACK_KEYWORDS, CallingConvention, Invocation, InvocationProber, MODULE_HELPER,
    ModuleFallback, ProbeError, RUN_METHODS, SCAN_TOKENS,
};
pub use reconnect::{MIN_BACKOFF_DELAY, ReconnectConfig, ReconnectPolicy};
pub use resolver::{
    CapabilityBinding, CapabilityResolver, DiscoveryError, DiscoveryProfile, FALLBACK_SUBSCRIPTION,
    FALLBACK_VENUE, InspectedLocation,
};
pub use supervisor::{ReconnectionSupervisor, SupervisorConfig, SupervisorError, SupervisorEvent};
