//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use gateway_relay_runtime::{HealthReport, HealthStatus};

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check the bus or the backend.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness check: registry statistics plus listener health.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "checks": [
///     { "component": "correlation_registry", "status": "healthy",
///       "metadata": { "pending_waiters": "3", "stored_results": "0", "settled_ids": "12" } },
///     { "component": "notification_listener", "status": "healthy",
///       "metadata": { "topic": "async-result" } }
///   ],
///   "timestamp": "2025-01-01T00:00:00Z"
/// }
/// ```
#[allow(clippy::unused_async)]
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let mut checks = vec![state.registry().health_check()];
    if let Some(listener) = &state.listener {
        checks.push(listener.health_check());
    }
    let report = HealthReport::new(checks);

    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report))
}
