//! # Gateway Relay Runtime
//!
//! Runtime pieces of the async result gateway.
//!
//! ## Core Components
//!
//! - **CorrelationRegistry**: rendezvous between callers waiting on a
//!   correlation id and completion notifications for that id
//! - **NotificationListener**: background task feeding bus messages into the registry
//! - **CallAndWait**: submit a call to the backend, then wait for its async result
//! - **Health**: component health checks for readiness endpoints
//!
//! ## Example
//!
//! ```ignore
//! use gateway_relay_runtime::{CallAndWait, CorrelationRegistry, NotificationListener};
//! use gateway_relay_runtime::config::RegistryConfig;
//!
//! let registry = CorrelationRegistry::new(RegistryConfig::default());
//! let listener = NotificationListener::spawn(bus, "async-result", registry.clone()).await?;
//! let gateway = CallAndWait::new(backend, registry);
//!
//! let outcome = gateway.execute(BackendCall::new(CallMethod::Get, "/people/names")).await;
//! ```

/// Registry configuration
pub mod config;

/// Correlation registry
pub mod registry;

/// Bus-to-registry notification listener
pub mod listener;

/// Call-and-wait orchestration
pub mod orchestrator;

/// Prometheus metrics for observability
pub mod metrics;

pub use listener::NotificationListener;
pub use orchestrator::{CallAndWait, GatewayOutcome};
pub use registry::{CompleteOutcome, CorrelationRegistry, CorrelationState, RegistryStats};

/// Error types for the runtime
pub mod error {
    use gateway_relay_core::CorrelationId;
    use std::time::Duration;
    use thiserror::Error;

    /// Errors returned by [`CorrelationRegistry::await_result`](crate::CorrelationRegistry::await_result).
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum AwaitError {
        /// No completion arrived within the timeout
        ///
        /// The caller should answer with a gateway timeout. A completion
        /// arriving afterwards is handled by the late completion policy.
        #[error("Timed out after {waited:?} waiting for result of '{id}'")]
        Timeout {
            /// Correlation id that was awaited
            id: CorrelationId,
            /// How long the caller waited
            waited: Duration,
        },

        /// The timeout was zero
        #[error("Await timeout must be greater than zero")]
        InvalidTimeout,

        /// The pending delivery was dropped without a result
        #[error("Pending delivery for '{id}' was closed")]
        Closed {
            /// Correlation id that was awaited
            id: CorrelationId,
        },
    }
}

pub use error::AwaitError;

/// Health check status levels
///
/// Indicates the current health state of a component or system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but impaired (e.g., listener reconnecting)
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Metadata (e.g., entry counts)
    #[serde(skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub metadata: std::collections::BTreeMap<String, String>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: std::collections::BTreeMap::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: std::collections::BTreeMap::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: std::collections::BTreeMap::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// Aggregated health report
///
/// Combines multiple health checks into an overall system status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    /// Overall system status (worst of all checks)
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,

    /// Timestamp when report was generated
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Create a new health report from checks
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Check if overall system is healthy
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Check if overall system is unhealthy
    #[must_use]
    pub const fn is_unhealthy(&self) -> bool {
        self.status.is_unhealthy()
    }
}

impl CorrelationRegistry {
    /// Health of the registry, with entry counts as metadata.
    ///
    /// Always healthy: the registry has no external dependency. The counts
    /// are there for operators.
    #[must_use]
    pub fn health_check(&self) -> HealthCheck {
        let stats = self.stats();
        HealthCheck::healthy("correlation_registry")
            .with_metadata("pending_waiters", stats.pending)
            .with_metadata("stored_results", stats.stored)
            .with_metadata("settled_ids", stats.settled)
    }
}
