//! Application state for Axum handlers.

use gateway_relay_runtime::metrics::MetricsServer;
use gateway_relay_runtime::{CallAndWait, CorrelationRegistry, NotificationListener};
use std::sync::Arc;

/// State shared by every handler.
///
/// The listener and metrics server are optional so the router can be
/// exercised without a bus or a Prometheus recorder.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator used by the proxy routes.
    pub gateway: CallAndWait,
    /// Listener feeding completions into the registry.
    pub listener: Option<Arc<NotificationListener>>,
    /// Prometheus renderer for `GET /metrics`.
    pub metrics: Option<Arc<MetricsServer>>,
}

impl AppState {
    /// State with only an orchestrator.
    #[must_use]
    pub const fn new(gateway: CallAndWait) -> Self {
        Self {
            gateway,
            listener: None,
            metrics: None,
        }
    }

    /// Attach the notification listener for readiness checks.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<NotificationListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Attach the metrics server.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsServer>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registry the orchestrator waits on.
    #[must_use]
    pub const fn registry(&self) -> &CorrelationRegistry {
        self.gateway.registry()
    }
}
