//! Port Interfaces
//!
//! Contracts between the integration core and the outside world.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ClientLibrary` and friends: the capability surface of a market-feed
//!   client whose exact API is unknown until runtime
//! - `NotificationTransport`: delivery of formatted alerts
//! - `RelayMetrics`: tick and notification counters

mod client;
mod metrics;
mod notification;

pub use client::{
    ArgValue, AttributeSource, CallArgs, CallError, ClientHandle, ClientLibrary, Constant,
    EntryType, EventCallback, InboundEvent, InstrumentSpec, LibraryRegistry, ModuleHandle,
    PendingCall,
};
pub use metrics::{NotificationOutcome, RelayMetrics};
pub use notification::{AlertMessage, DeliveryError, NotificationTransport, ParseMode};

#[cfg(test)]
pub use metrics::MockRelayMetrics;
#[cfg(test)]
pub use notification::MockNotificationTransport;
