//! End-to-end tests for [`CallAndWait`]: mock backend, in-memory bus,
//! notification listener and registry.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use gateway_relay_core::{Acceptance, BackendCall, BackendError, CallMethod, Outcome};
use gateway_relay_runtime::{CallAndWait, CorrelationRegistry, GatewayOutcome, NotificationListener};
use gateway_relay_testing::{InMemoryEventBus, MockBackend};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const TOPIC: &str = "async-result";

struct Harness {
    gateway: CallAndWait,
    backend: Arc<MockBackend>,
    registry: CorrelationRegistry,
    _listener: NotificationListener,
}

async fn harness(script: impl FnOnce(MockBackend) -> MockBackend) -> Harness {
    let bus = Arc::new(InMemoryEventBus::new());
    let registry = CorrelationRegistry::default();
    let listener = NotificationListener::spawn(bus.clone(), TOPIC, registry.clone())
        .await
        .unwrap();
    let backend = Arc::new(script(MockBackend::new().publishing_to(bus, TOPIC)));
    let gateway = CallAndWait::new(backend.clone(), registry.clone()).with_timeout(Duration::from_secs(5));
    Harness {
        gateway,
        backend,
        registry,
        _listener: listener,
    }
}

fn get_names() -> BackendCall {
    BackendCall::new(CallMethod::Get, "/people/names")
}

#[tokio::test(start_paused = true)]
async fn test_completed_after_delay() {
    let h = harness(|b| {
        b.accept_and_complete("req-1", Outcome::Succeeded(json!(["Ayaka", "Kuro"])), Duration::from_secs(2))
    })
    .await;

    let start = Instant::now();
    let outcome = h.gateway.execute(get_names()).await;

    match outcome {
        GatewayOutcome::Completed { id, data } => {
            assert_eq!(id.as_str(), "req-1");
            assert_eq!(data, json!(["Ayaka", "Kuro"]));
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_completion_before_acknowledgement_is_not_lost() {
    let h = harness(|b| b.accept_and_complete("req-fast", Outcome::Succeeded(json!(1)), Duration::ZERO)).await;

    // The completion is on the bus before the acknowledgement returns.
    let outcome = h.gateway.execute(get_names()).await;
    assert!(matches!(outcome, GatewayOutcome::Completed { .. }), "{outcome:?}");
}

#[tokio::test(start_paused = true)]
async fn test_failed_work_is_reported() {
    let h = harness(|b| {
        b.accept_and_complete("req-2", Outcome::Failed("boom".into()), Duration::from_millis(300))
    })
    .await;

    let outcome = h.gateway.execute(get_names()).await;
    assert_eq!(outcome.correlation_id(), Some("req-2"));
    assert!(matches!(outcome, GatewayOutcome::Failed { ref error, .. } if error == "boom"));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_carries_correlation_id() {
    let h = harness(|b| b.accept("req-slow")).await;

    let start = Instant::now();
    let outcome = h.gateway.execute(get_names()).await;

    assert_eq!(
        outcome,
        GatewayOutcome::TimedOut {
            id: gateway_relay_testing::correlation_id("req-slow"),
            waited: Duration::from_secs(5),
        }
    );
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(h.registry.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_acknowledgement_skips_registry() {
    let h = harness(|b| {
        b.reply(Acceptance::rejected(400, "invalid name"))
            .reply(Acceptance {
                code: Some(200),
                ..Acceptance::accepted("req-sync")
            })
    })
    .await;

    let outcome = h.gateway.execute(get_names()).await;
    match &outcome {
        GatewayOutcome::Rejected(ack) => assert_eq!(ack.code, Some(400)),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(outcome.correlation_id(), None);

    // Accepted but not a 202: not async work, nothing to wait for.
    let outcome = h.gateway.execute(get_names()).await;
    assert!(matches!(outcome, GatewayOutcome::Rejected(_)));
    assert_eq!(outcome.correlation_id(), Some("req-sync"));

    assert_eq!(h.registry.stats().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_backend() {
    let h = harness(|b| b.fail(BackendError::Unreachable("connection refused".into()))).await;

    let outcome = h.gateway.execute(get_names()).await;
    match outcome {
        GatewayOutcome::BackendUnavailable(reason) => assert!(reason.contains("connection refused")),
        other => panic!("expected backend failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_call_is_forwarded_unchanged() {
    let h = harness(|b| b.accept_and_complete("req-4", Outcome::Succeeded(json!(null)), Duration::from_millis(10))).await;

    let call = BackendCall::new(CallMethod::Post, "/people/names")
        .with_body(json!({"name": "Ayaka"}))
        .with_authorization("Bearer token-1");
    h.gateway.execute(call.clone()).await;

    assert_eq!(h.backend.calls(), vec![call]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_override_is_ignored() {
    let h = harness(|b| b).await;
    let gateway = h.gateway.clone().with_timeout(Duration::ZERO);
    assert_eq!(gateway.timeout(), Duration::from_secs(5));
}
