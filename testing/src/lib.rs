//! # Gateway Relay Testing
//!
//! Testing utilities and helpers for the gateway relay.
//!
//! This crate provides:
//! - Mock implementations of the boundary traits (`EventBus`, `AsyncBackend`)
//! - Fixtures for completion records and wire payloads
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use gateway_relay_testing::{helpers, mocks::{InMemoryEventBus, MockBackend}};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_call_and_wait() {
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let backend = MockBackend::new()
//!         .publishing_to(bus.clone(), "async-result")
//!         .accept_and_complete("req-1", Outcome::Succeeded(json!(1)), Duration::from_millis(50));
//!     // spawn a listener, build a CallAndWait, execute
//! }
//! ```

use chrono::{DateTime, Utc};

/// Mock implementations of the boundary traits.
pub mod mocks;

/// Fixtures for completion records and wire payloads.
pub mod helpers {
    use super::{DateTime, Utc};
    use gateway_relay_core::{CompletionRecord, CorrelationId, Value};

    /// Parse a correlation id known to be valid.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is blank.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn correlation_id(raw: &str) -> CorrelationId {
        CorrelationId::parse(raw).expect("fixture correlation id must not be blank")
    }

    /// A successful completion for `id`.
    #[must_use]
    pub fn completed(id: &str, data: Value) -> CompletionRecord {
        CompletionRecord::succeeded(correlation_id(id), data)
    }

    /// A failed completion for `id`.
    #[must_use]
    pub fn failed(id: &str, error: &str) -> CompletionRecord {
        CompletionRecord::failed(correlation_id(id), error)
    }

    /// Raw bus payload in the worker's wire format.
    #[must_use]
    pub fn completion_payload(id: &str, status: &str, data: &Value) -> Vec<u8> {
        let message = serde_json::json!({
            "requestId": id,
            "status": status,
            "data": data,
            "source": "test-worker",
            "timestamp": test_timestamp().to_rfc3339(),
        });
        serde_json::to_vec(&message).unwrap_or_default()
    }

    /// Fixed production timestamp for fixtures (2025-01-01 00:00:00 UTC).
    #[must_use]
    pub fn test_timestamp() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Install a `tracing` subscriber for test output.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gateway_relay=debug")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing strategies using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Non-blank correlation ids, shaped like the ids backends hand out.
    pub fn correlation_id() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9][a-zA-Z0-9_-]{0,35}"
    }

    /// Distinct correlation ids.
    pub fn distinct_ids(max: usize) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::hash_set(correlation_id(), 1..=max.max(1))
            .prop_map(|ids| ids.into_iter().collect())
    }
}

// Re-export commonly used items
pub use helpers::{completed, correlation_id, failed};
pub use mocks::{InMemoryEventBus, MockBackend};
