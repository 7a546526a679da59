//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus the process-level concerns (configuration, telemetry, metrics,
//! health endpoint).

/// Capability tables and compiled-in client library shims.
pub mod shim;

/// Telegram Bot API notification transport.
pub mod telegram;

/// Environment configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Supervisor status tracking.
pub mod status;

/// OpenTelemetry tracing integration.
pub mod telemetry;
