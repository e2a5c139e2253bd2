//! Behavioural tests for [`CorrelationRegistry`].
//!
//! Time-dependent tests run on a paused tokio clock, so timeouts and
//! retention windows are exact and the suite runs instantly.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use futures::FutureExt;
use gateway_relay_core::{CompletionRecord, Outcome};
use gateway_relay_runtime::config::{LateCompletionPolicy, RegistryConfig};
use gateway_relay_runtime::{AwaitError, CompleteOutcome, CorrelationRegistry, CorrelationState};
use gateway_relay_testing::{completed, correlation_id, failed, properties};
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

fn registry() -> CorrelationRegistry {
    CorrelationRegistry::new(
        RegistryConfig::builder()
            .retention(Duration::from_secs(60))
            .build(),
    )
}

fn spawn_wait(
    registry: &CorrelationRegistry,
    id: &str,
    timeout: Duration,
) -> tokio::task::JoinHandle<Result<CompletionRecord, AwaitError>> {
    let registry = registry.clone();
    let id = correlation_id(id);
    tokio::spawn(async move { registry.await_result(&id, timeout).await })
}

// ============================================================================
// Example scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_waiter_resolved_when_completion_arrives() {
    let registry = registry();
    let start = Instant::now();
    let waiter = spawn_wait(&registry, "req-1", Duration::from_secs(30));

    tokio::time::sleep(Duration::from_secs(2)).await;
    registry.complete(completed("req-1", json!(42)));

    let record = waiter.await.unwrap().unwrap();
    assert_eq!(record.outcome, Outcome::Succeeded(json!(42)));
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_early_failure_claimed_immediately() {
    let registry = registry();
    registry.complete(failed("req-2", "boom"));

    tokio::time::sleep(Duration::from_secs(5)).await;

    let record = registry
        .await_result(&correlation_id("req-2"), Duration::from_secs(10))
        .now_or_never()
        .expect("early result must not suspend")
        .unwrap();
    assert_eq!(record.outcome, Outcome::Failed("boom".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_expired_early_result_is_not_returned() {
    let registry = registry();
    registry.complete(completed("req-3", json!("late")));

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(registry.state(&correlation_id("req-3")), CorrelationState::Unknown);

    let start = Instant::now();
    let result = registry
        .await_result(&correlation_id("req-3"), Duration::from_secs(10))
        .await;
    assert!(matches!(result, Err(AwaitError::Timeout { .. })));
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

// ============================================================================
// Hand-off and early arrival
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_result_lost_when_wait_and_completion_race() {
    gateway_relay_testing::helpers::init_test_tracing();
    let registry = CorrelationRegistry::default();
    let mut tasks = Vec::new();

    for i in 0..200 {
        let id = format!("race-{i}");
        let waiter = spawn_wait(&registry, &id, Duration::from_secs(10));
        let completer = {
            let registry = registry.clone();
            let id = id.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    tokio::task::yield_now().await;
                }
                registry.complete(completed(&id, json!(i)));
            })
        };
        tasks.push((i, waiter, completer));
    }

    for (i, waiter, completer) in tasks {
        completer.await.unwrap();
        let record = waiter.await.unwrap().expect("result must not be lost");
        assert_eq!(record.outcome, Outcome::Succeeded(json!(i)));
    }
    assert_eq!(registry.pending_count(), 0);
    assert_eq!(registry.stored_count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_completion_before_deadline_is_delivered(
        id in properties::correlation_id(),
        delay_ms in 0u64..29_000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let elapsed = runtime.block_on(async {
            let registry = registry();
            let start = Instant::now();
            let waiter = spawn_wait(&registry, &id, Duration::from_secs(30));
            tokio::task::yield_now().await;

            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            registry.complete(completed(&id, json!(delay_ms)));

            let record = waiter.await.unwrap().unwrap();
            assert_eq!(record.outcome, Outcome::Succeeded(json!(delay_ms)));
            start.elapsed()
        });

        prop_assert_eq!(elapsed, Duration::from_millis(delay_ms));
    }
}

// ============================================================================
// Expiry and timeout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unclaimed_result_discarded_after_retention() {
    let registry = registry();
    registry.complete(completed("lonely", json!(null)));

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(registry.stored_count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(registry.stored_count(), 0);
    assert_eq!(registry.stats().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_at_deadline() {
    let registry = registry();
    let start = Instant::now();
    let result = registry
        .await_result(&correlation_id("never"), Duration::from_secs(7))
        .await;

    match result {
        Err(AwaitError::Timeout { id, waited }) => {
            assert_eq!(id.as_str(), "never");
            assert_eq!(waited, Duration::from_secs(7));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(7));
    assert!(elapsed < Duration::from_secs(7) + Duration::from_millis(10));
    assert_eq!(registry.pending_count(), 0);
}

// ============================================================================
// Coalescing and duplicates
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_waits_share_one_delivery() {
    let registry = registry();
    let first = spawn_wait(&registry, "shared", Duration::from_secs(30));
    let second = spawn_wait(&registry, "shared", Duration::from_secs(30));
    tokio::task::yield_now().await;

    assert_eq!(
        registry.state(&correlation_id("shared")),
        CorrelationState::Waiting { waiters: 2 }
    );
    assert_eq!(registry.pending_count(), 1);

    assert_eq!(
        registry.complete(completed("shared", json!("once"))),
        CompleteOutcome::Delivered
    );
    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!(a, b);

    // The record was handed off; it is not available a second time.
    let again = registry
        .await_result(&correlation_id("shared"), Duration::from_secs(1))
        .await;
    assert!(matches!(again, Err(AwaitError::Timeout { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_completion_with_waiter_is_noop() {
    let registry = registry();
    let waiter = spawn_wait(&registry, "dup", Duration::from_secs(30));
    tokio::task::yield_now().await;

    assert_eq!(registry.complete(completed("dup", json!(1))), CompleteOutcome::Delivered);
    assert_eq!(registry.complete(completed("dup", json!(2))), CompleteOutcome::Duplicate);

    let record = waiter.await.unwrap().unwrap();
    assert_eq!(record.outcome, Outcome::Succeeded(json!(1)));
    assert_eq!(registry.stored_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_early_result_keeps_first() {
    let registry = registry();
    assert_eq!(registry.complete(completed("early", json!("first"))), CompleteOutcome::Stored);
    assert_eq!(registry.complete(completed("early", json!("second"))), CompleteOutcome::Duplicate);
    assert_eq!(registry.stored_count(), 1);

    let record = registry
        .await_result(&correlation_id("early"), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(record.outcome, Outcome::Succeeded(json!("first")));
}

#[tokio::test(start_paused = true)]
async fn test_one_timed_out_waiter_does_not_end_shared_wait() {
    let registry = registry();
    let short = spawn_wait(&registry, "mixed", Duration::from_secs(1));
    let long = spawn_wait(&registry, "mixed", Duration::from_secs(30));
    tokio::task::yield_now().await;

    assert!(matches!(short.await.unwrap(), Err(AwaitError::Timeout { .. })));
    assert_eq!(
        registry.state(&correlation_id("mixed")),
        CorrelationState::Waiting { waiters: 1 }
    );

    assert_eq!(registry.complete(completed("mixed", json!(true))), CompleteOutcome::Delivered);
    assert!(long.await.unwrap().is_ok());
}

// ============================================================================
// Late completions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_late_completion_dropped_by_default() {
    let registry = registry();
    let result = registry
        .await_result(&correlation_id("late"), Duration::from_secs(5))
        .await;
    assert!(result.is_err());

    assert_eq!(registry.complete(completed("late", json!(1))), CompleteOutcome::Late);
    assert_eq!(registry.stored_count(), 0);

    // The marker goes away with the retention window.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(registry.stats().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_completion_retained_for_retry() {
    let registry = CorrelationRegistry::new(
        RegistryConfig::builder()
            .late_completion(LateCompletionPolicy::Retain)
            .build(),
    );
    let result = registry
        .await_result(&correlation_id("retry"), Duration::from_secs(5))
        .await;
    assert!(result.is_err());

    assert_eq!(registry.complete(completed("retry", json!("ok"))), CompleteOutcome::Stored);
    let record = registry
        .await_result(&correlation_id("retry"), Duration::from_secs(5))
        .now_or_never()
        .expect("retained result must be immediate")
        .unwrap();
    assert!(record.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_await_after_settled_starts_fresh_wait() {
    let registry = registry();
    registry.complete(completed("again", json!(1)));
    registry
        .await_result(&correlation_id("again"), Duration::from_secs(1))
        .await
        .unwrap();

    let waiter = spawn_wait(&registry, "again", Duration::from_secs(30));
    tokio::task::yield_now().await;
    assert_eq!(
        registry.state(&correlation_id("again")),
        CorrelationState::Waiting { waiters: 1 }
    );
    assert_eq!(registry.complete(completed("again", json!(2))), CompleteOutcome::Delivered);
    assert_eq!(
        waiter.await.unwrap().unwrap().outcome,
        Outcome::Succeeded(json!(2))
    );
}

// ============================================================================
// Independence across ids
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_ids_do_not_interfere() {
    let registry = registry();
    let a = spawn_wait(&registry, "a", Duration::from_secs(30));
    let b = spawn_wait(&registry, "b", Duration::from_secs(30));
    tokio::task::yield_now().await;

    registry.complete(completed("b", json!("b")));
    assert_eq!(b.await.unwrap().unwrap().outcome, Outcome::Succeeded(json!("b")));
    assert_eq!(
        registry.state(&correlation_id("a")),
        CorrelationState::Waiting { waiters: 1 }
    );

    registry.complete(completed("a", json!("a")));
    assert_eq!(a.await.unwrap().unwrap().outcome, Outcome::Succeeded(json!("a")));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_each_id_claims_its_own_early_result(ids in properties::distinct_ids(16)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let registry = registry();
            for id in &ids {
                assert_eq!(registry.complete(completed(id, json!(id))), CompleteOutcome::Stored);
            }
            assert_eq!(registry.stored_count(), ids.len());

            for id in ids.iter().rev() {
                let record = registry
                    .await_result(&correlation_id(id), Duration::from_secs(1))
                    .now_or_never()
                    .expect("early result is claimed without waiting")
                    .unwrap();
                assert_eq!(record.outcome, Outcome::Succeeded(json!(id)));
            }
            assert_eq!(registry.stored_count(), 0);
        });
    }
}

#[tokio::test(start_paused = true)]
async fn test_await_default_uses_configured_timeout() {
    let registry = CorrelationRegistry::new(
        RegistryConfig::builder()
            .wait_timeout(Duration::from_secs(3))
            .build(),
    );
    let start = Instant::now();
    let result = registry.await_default(&correlation_id("default")).await;
    assert!(matches!(result, Err(AwaitError::Timeout { waited, .. }) if waited == Duration::from_secs(3)));
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}
