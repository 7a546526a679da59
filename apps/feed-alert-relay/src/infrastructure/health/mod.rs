//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, supervisor status, latest prices and
//! Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (ready while streaming)
//! - `GET /prices` - Latest price per instrument
//! - `GET /metrics` - Prometheus metrics in text format

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::connection::SupervisorState;
use crate::domain::market::{PriceObservation, SharedPriceTable};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::status::RelayStatus;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Supervisor details.
    pub supervisor: SupervisorInfo,
    /// Instruments with at least one observed price.
    pub tracked_instruments: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Streaming.
    Healthy,
    /// Reconnecting.
    Degraded,
    /// Supervisor has stopped.
    Unhealthy,
}

/// Supervisor section of the health response.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorInfo {
    /// Lifecycle state label.
    pub state: &'static str,
    /// Negotiation rounds started.
    pub attempts: u64,
    /// Failed attempts since the last stream.
    pub consecutive_failures: u32,
    /// Streams that ended.
    pub streams_ended: u64,
    /// Run method of the current or last stream.
    pub stream_method: Option<String>,
    /// When a constructor last succeeded.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent failure.
    pub last_error: Option<String>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    status: Arc<RelayStatus>,
    prices: SharedPriceTable,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub const fn new(version: String, status: Arc<RelayStatus>, prices: SharedPriceTable) -> Self {
        Self {
            version,
            status,
            prices,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by the health server.
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/prices", get(prices_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.status.is_streaming() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn prices_handler(
    State(state): State<Arc<HealthServerState>>,
) -> Json<BTreeMap<String, PriceObservation>> {
    Json(state.prices.snapshot())
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let status = &state.status;
    let supervisor_state = status.state();

    HealthResponse {
        status: determine_health_status(supervisor_state),
        version: state.version.clone(),
        uptime_secs: status.uptime_secs(),
        current_time: Utc::now(),
        supervisor: SupervisorInfo {
            state: supervisor_state.as_str(),
            attempts: status.attempts(),
            consecutive_failures: status.consecutive_failures(),
            streams_ended: status.streams_ended(),
            stream_method: status.stream_method(),
            last_connected_at: status.last_connected_at(),
            last_error: status.last_error(),
        },
        tracked_instruments: state.prices.len(),
    }
}

const fn determine_health_status(state: SupervisorState) -> HealthStatus {
    match state {
        SupervisorState::Streaming => HealthStatus::Healthy,
        SupervisorState::Terminated => HealthStatus::Unhealthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::application::services::SupervisorEvent;
    use crate::domain::market::{CanonicalTick, LatestPriceTable};

    fn state() -> (Arc<RelayStatus>, SharedPriceTable, Arc<HealthServerState>) {
        let status = Arc::new(RelayStatus::new());
        let prices: SharedPriceTable = Arc::new(LatestPriceTable::new());
        let state = Arc::new(HealthServerState::new(
            "0.1.0".to_string(),
            Arc::clone(&status),
            Arc::clone(&prices),
        ));
        (status, prices, state)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_supervisor_state() {
        assert_eq!(
            determine_health_status(SupervisorState::Streaming),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(SupervisorState::BackingOff),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(SupervisorState::Terminated),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn readiness_tracks_streaming() {
        let (status, _prices, state) = state();

        let (code, body) = get_body(router(Arc::clone(&state)), "/readyz").await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "NOT READY");

        status.apply(&SupervisorEvent::StateChanged(SupervisorState::Streaming));
        let (code, body) = get_body(router(state), "/readyz").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, "READY");
    }

    #[tokio::test]
    async fn health_reports_supervisor_and_prices() {
        let (status, prices, state) = state();
        status.apply(&SupervisorEvent::StateChanged(SupervisorState::BackingOff));
        prices.record(&CanonicalTick::new("1333", 1642.55));

        let (code, body) = get_body(router(state), "/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["supervisor"]["state"], "backoff");
        assert_eq!(json["tracked_instruments"], 1);
    }

    #[tokio::test]
    async fn prices_returns_snapshot() {
        let (_status, prices, state) = state();
        prices.record(&CanonicalTick::new("1333", 1642.55));

        let (code, body) = get_body(router(state), "/prices").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["1333"]["price"], 1642.55);
    }

    #[tokio::test]
    async fn liveness_is_unconditional() {
        let (_status, _prices, state) = state();
        let (code, body) = get_body(router(state), "/healthz").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, "OK");
    }
}
