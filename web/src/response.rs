//! HTTP rendering of gateway outcomes.

use crate::error::{AppError, CORRELATION_ID_HEADER};
use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use gateway_relay_runtime::GatewayOutcome;

/// Wraps a [`GatewayOutcome`] so handlers can return it directly.
///
/// | Outcome              | Status                                  |
/// |----------------------|-----------------------------------------|
/// | `Completed`          | 200, body is the result payload         |
/// | `Failed`             | 500 `ASYNC_FAILED`                      |
/// | `TimedOut`           | 504 `GATEWAY_TIMEOUT`                   |
/// | `Rejected`           | backend's own 4xx/5xx code, else 502    |
/// | `BackendUnavailable` | 502 `BAD_GATEWAY`                       |
#[derive(Debug)]
pub struct GatewayResponse(pub GatewayOutcome);

impl From<GatewayOutcome> for GatewayResponse {
    fn from(outcome: GatewayOutcome) -> Self {
        Self(outcome)
    }
}

/// Status used to echo a refused acknowledgement.
fn rejection_status(code: Option<u16>) -> StatusCode {
    code.filter(|code| (400..=599).contains(code))
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let correlation_id = self.0.correlation_id().map(ToString::to_string);

        let mut response = match self.0 {
            GatewayOutcome::Completed { data, .. } => (StatusCode::OK, Json(data)).into_response(),
            GatewayOutcome::Failed { id, error } => AppError::async_failed(error)
                .with_correlation_id(id.into_inner())
                .into_response(),
            GatewayOutcome::TimedOut { id, waited } => AppError::gateway_timeout(format!(
                "No result received within {}s",
                waited.as_secs_f64()
            ))
            .with_correlation_id(id.into_inner())
            .into_response(),
            GatewayOutcome::Rejected(ack) => {
                (rejection_status(ack.code), Json(ack)).into_response()
            }
            GatewayOutcome::BackendUnavailable(reason) => {
                AppError::bad_gateway(reason).into_response()
            }
        };

        if let Some(value) = correlation_id
            .as_deref()
            .and_then(|id| HeaderValue::from_str(id).ok())
        {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }
        response
    }
}
