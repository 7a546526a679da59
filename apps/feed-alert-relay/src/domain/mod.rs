//! Domain Layer - Core tick and connection types.
//!
//! This layer holds the canonical market data representation and the
//! vocabulary of the connection lifecycle. It has no knowledge of any
//! particular client library or notification transport.

/// Canonical ticks and the latest-price table.
pub mod market;

/// Per-instrument notification cooldown tracking.
pub mod throttle;

/// Connection attempt vocabulary (versions, constructor mappings, states).
pub mod connection;
