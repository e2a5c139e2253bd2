//! Axum integration for the gateway relay.
//!
//! The web layer is a thin shell over [`CallAndWait`](gateway_relay_runtime::CallAndWait):
//!
//! ```text
//! client ──HTTP──► /async/*path ──► CallAndWait ──► HttpBackend ──► backend
//!                                       │                             │
//!                                       ▼                             ▼
//!                              CorrelationRegistry ◄── listener ◄── bus
//! ```
//!
//! 1. **HTTP Request** arrives at the proxy handler
//! 2. **Build call** from method, path, query, JSON body and `Authorization`
//! 3. **Submit** through the orchestrator and wait on the correlation id
//! 4. **Map outcome** to an HTTP response ([`GatewayResponse`])
//!
//! # Example
//!
//! ```ignore
//! use gateway_relay_web::{AppState, HttpBackend, router};
//!
//! let backend = Arc::new(HttpBackend::new("http://backend:8081", Duration::from_secs(10))?);
//! let gateway = CallAndWait::new(backend, registry);
//! let app = router(AppState::new(gateway));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod error;
pub mod handlers;
pub mod response;
pub mod state;

use axum::{
    Router,
    routing::{any, get},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use backend::HttpBackend;
pub use error::{AppError, CORRELATION_ID_HEADER};
pub use response::GatewayResponse;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the gateway router.
///
/// | Route             | Handler                                  |
/// |-------------------|------------------------------------------|
/// | `ANY /async/*path`| [`handlers::proxy`]                      |
/// | `GET /health`     | [`handlers::health_check`]               |
/// | `GET /health/ready`| [`handlers::readiness_check`]           |
/// | `GET /metrics`    | [`handlers::metrics`]                    |
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/async/*path", any(handlers::proxy))
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
