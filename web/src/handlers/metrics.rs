//! Prometheus scrape endpoint.

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};

/// Render the Prometheus text exposition.
///
/// # Endpoint
///
/// ```text
/// GET /metrics
/// ```
///
/// # Errors
///
/// Returns 503 when no recorder was installed by this process.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .as_ref()
        .and_then(|server| server.render())
        .ok_or_else(|| AppError::unavailable("Metrics recorder is not installed"))?;

    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
