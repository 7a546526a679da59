//! Application Layer - Ports and the adaptive integration services.
//!
//! Ports describe the client library surface and the notification
//! transport. Services drive discovery, negotiation, probing, tick
//! normalization, throttled notification and reconnection.

/// Port interfaces for the client library and notification transport.
pub mod ports;

/// Integration services coordinating the ports.
pub mod services;
