//! Call-and-wait orchestration.
//!
//! Turns an asynchronous backend into a synchronous one for the caller:
//!
//! 1. Submit the call to the backend.
//! 2. If the acknowledgement is an accepted 202 with a `requestId`, wait on
//!    that id in the registry.
//! 3. Report the completion, the timeout, or the refusal.
//!
//! A completion that arrives between steps 1 and 2 is not lost: the registry
//! parks it and the wait claims it at once.

use crate::error::AwaitError;
use crate::registry::CorrelationRegistry;
use gateway_relay_core::{
    Acceptance, AsyncBackend, BackendCall, CorrelationId, Outcome, Value,
};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;

/// Result of one call-and-wait cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    /// The async work finished successfully.
    Completed {
        /// Correlation id of the work.
        id: CorrelationId,
        /// Result payload.
        data: Value,
    },
    /// The async work finished with a failure.
    Failed {
        /// Correlation id of the work.
        id: CorrelationId,
        /// Failure description.
        error: String,
    },
    /// No result arrived in time.
    TimedOut {
        /// Correlation id of the work.
        id: CorrelationId,
        /// How long the gateway waited.
        waited: Duration,
    },
    /// The backend did not accept the work; nothing was awaited.
    Rejected(Acceptance),
    /// The backend could not be called.
    BackendUnavailable(String),
}

impl GatewayOutcome {
    /// Correlation id, when the backend assigned one.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Completed { id, .. } | Self::Failed { id, .. } | Self::TimedOut { id, .. } => {
                Some(id.as_str())
            }
            Self::Rejected(ack) => ack.request_id.as_deref().filter(|id| !id.trim().is_empty()),
            Self::BackendUnavailable(_) => None,
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed_out",
            Self::Rejected(_) => "rejected",
            Self::BackendUnavailable(_) => "backend_unavailable",
        }
    }
}

/// Submits calls to an [`AsyncBackend`] and waits for their async results.
#[derive(Clone)]
pub struct CallAndWait {
    backend: Arc<dyn AsyncBackend>,
    registry: CorrelationRegistry,
    timeout: Duration,
}

impl CallAndWait {
    /// Create an orchestrator using the registry's default wait timeout.
    #[must_use]
    pub fn new(backend: Arc<dyn AsyncBackend>, registry: CorrelationRegistry) -> Self {
        let timeout = registry.config().wait_timeout;
        Self {
            backend,
            registry,
            timeout,
        }
    }

    /// Override the wait timeout. A zero duration keeps the current value.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// The wait timeout applied to every call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The registry this orchestrator waits on.
    #[must_use]
    pub const fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    /// Submit `call` and wait for its result.
    ///
    /// Never fails: every path, including an unreachable backend, is
    /// described by the returned [`GatewayOutcome`].
    pub async fn execute(&self, call: BackendCall) -> GatewayOutcome {
        let method = call.method;
        let path = call.path.clone();

        let outcome = match self.backend.submit(call).await {
            Err(e) => {
                tracing::error!(method = %method, path = %path, error = %e, "Backend call failed");
                GatewayOutcome::BackendUnavailable(e.to_string())
            }
            Ok(ack) => match ack.correlation_id() {
                None => {
                    tracing::warn!(
                        method = %method,
                        path = %path,
                        code = ?ack.code,
                        message = ack.message.as_deref().unwrap_or(""),
                        "Backend did not accept async work"
                    );
                    GatewayOutcome::Rejected(ack)
                }
                Some(id) => {
                    tracing::debug!(correlation_id = %id, method = %method, path = %path, "Awaiting async result");
                    self.wait(id).await
                }
            },
        };

        counter!("relay_gateway_requests_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn wait(&self, id: CorrelationId) -> GatewayOutcome {
        match self.registry.await_result(&id, self.timeout).await {
            Ok(record) => match record.outcome {
                Outcome::Succeeded(data) => GatewayOutcome::Completed { id, data },
                Outcome::Failed(error) => {
                    tracing::warn!(correlation_id = %id, error = %error, "Async work failed");
                    GatewayOutcome::Failed { id, error }
                }
            },
            Err(AwaitError::Timeout { waited, .. }) => GatewayOutcome::TimedOut { id, waited },
            Err(e @ (AwaitError::InvalidTimeout | AwaitError::Closed { .. })) => {
                tracing::error!(correlation_id = %id, error = %e, "Await aborted");
                GatewayOutcome::Failed {
                    id,
                    error: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for CallAndWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallAndWait")
            .field("timeout", &self.timeout)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
