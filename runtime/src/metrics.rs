//! Prometheus metrics for observability and monitoring.
//!
//! Metrics are emitted with the `metrics` macros wherever the event happens
//! (registry, listener, orchestrator). This module installs the Prometheus
//! recorder and describes every metric:
//! - Registry hand-offs, early results and expiry
//! - Wait timeouts, duplicate and late completions
//! - Listener throughput and malformed notifications
//! - Gateway outcomes per request
//!
//! # Example
//!
//! ```rust,no_run
//! use gateway_relay_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.start()?;
//!
//! // Served by the web layer on GET /metrics
//! let body = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder and renderer.
///
/// The rendered text is exposed by the web layer; this type owns no socket.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an uninstalled metrics server.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves [`handle`](Self::handle) empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Registry
    describe_counter!(
        "relay_waiters_registered_total",
        "Callers that started waiting on a new correlation id"
    );
    describe_counter!(
        "relay_waiters_coalesced_total",
        "Callers that joined an existing wait on the same correlation id"
    );
    describe_counter!(
        "relay_results_delivered_total",
        "Completions handed directly to waiting callers"
    );
    describe_counter!(
        "relay_results_stored_total",
        "Completions parked because no caller was waiting yet"
    );
    describe_counter!(
        "relay_results_claimed_early_total",
        "Parked completions claimed by a later wait"
    );
    describe_counter!(
        "relay_results_expired_total",
        "Parked completions discarded after the retention window"
    );
    describe_counter!(
        "relay_await_timeouts_total",
        "Waits that ended without a result"
    );
    describe_counter!(
        "relay_completions_duplicate_total",
        "Completions ignored because the id already had a result"
    );
    describe_counter!(
        "relay_completions_late_total",
        "Completions dropped because their waiter had timed out"
    );
    describe_gauge!(
        "relay_pending_waiters",
        "Correlation ids with suspended callers"
    );
    describe_gauge!(
        "relay_stored_results",
        "Parked completions awaiting a claim"
    );
    describe_histogram!(
        "relay_await_duration_seconds",
        "Time callers spent waiting for a result"
    );

    // Listener
    describe_counter!(
        "relay_notifications_received_total",
        "Messages received on the completion topic"
    );
    describe_counter!(
        "relay_notifications_malformed_total",
        "Messages skipped because they were not usable completions"
    );

    // Gateway
    describe_counter!(
        "relay_gateway_requests_total",
        "Call-and-wait cycles by outcome"
    );
}
