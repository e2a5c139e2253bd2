//! Correlation registry: matches async completions with suspended callers.
//!
//! Two things race for every correlation id: a caller that wants to wait for
//! the result ([`CorrelationRegistry::await_result`]) and the bus notification
//! that carries it ([`CorrelationRegistry::complete`]). Either may come first.
//!
//! ```text
//!             await_result(id)                      complete(record)
//!                   │                                      │
//!                   ▼                                      ▼
//!        ┌─────────────────────┐   hand-off   ┌─────────────────────┐
//!        │ Waiting             │ ◄─────────── │ Waiting? deliver    │
//!        │ (shared future)     │              │ else park           │
//!        └─────────────────────┘              └──────────┬──────────┘
//!                   ▲ claim                              ▼
//!                   └──────────────────────── ┌─────────────────────┐
//!                                             │ Arrived             │
//!                                             │ (expires after      │
//!                                             │  retention window)  │
//!                                             └─────────────────────┘
//! ```
//!
//! # Concurrency
//!
//! Entries live in a fixed set of shards, each a `Mutex<HashMap>`. All state
//! for one id sits in a single entry of a single shard, so the check "does a
//! counterpart exist?" and the resulting insert or removal happen under one
//! lock. Unrelated ids only contend when they hash to the same shard. No lock
//! is held across an `.await`.
//!
//! # Entry lifecycle
//!
//! - `Waiting`: one or more callers share a single delivery future.
//! - `Arrived`: a record came in before anyone asked for it. Claimed by the
//!   next `await_result`, or discarded when its expiry timer fires.
//! - `Settled`: a short-lived marker left after a hand-off or a timeout, so
//!   duplicate and late notifications are recognised and dropped. Callers
//!   never see it; to `await_result` a settled id is unknown.

use crate::config::{LateCompletionPolicy, RegistryConfig};
use crate::error::AwaitError;
use futures::future::{FutureExt, Shared};
use gateway_relay_core::{CompletionRecord, CorrelationId};
use metrics::{counter, gauge, histogram};
use std::collections::hash_map::{Entry, HashMap, RandomState};
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

type Delivery = Shared<oneshot::Receiver<CompletionRecord>>;
type Shard = HashMap<CorrelationId, Slot>;

/// Externally visible state of a correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationState {
    /// Nothing is known about the id.
    Unknown,
    /// Callers are suspended on the id.
    Waiting {
        /// Number of callers sharing the pending delivery.
        waiters: usize,
    },
    /// A result is parked, waiting to be claimed.
    Arrived,
    /// The id was recently delivered or timed out; awaiting it starts fresh.
    Settled,
}

/// What [`CorrelationRegistry::complete`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// Handed to suspended callers.
    Delivered,
    /// Parked as an early result.
    Stored,
    /// Ignored: a record for this id is already parked or was just delivered.
    Duplicate,
    /// Dropped: the caller for this id already timed out.
    Late,
    /// Ignored: empty id or id mismatch.
    Rejected,
}

/// Point-in-time entry counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Ids with suspended callers.
    pub pending: usize,
    /// Parked early results.
    pub stored: usize,
    /// Settled-id markers.
    pub settled: usize,
}

impl RegistryStats {
    /// Total entries held.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.stored + self.settled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettleReason {
    Delivered,
    TimedOut,
}

/// Aborts the expiry task when the owning entry goes away.
struct ExpiryTimer(Option<AbortHandle>);

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

struct Waiting {
    generation: u64,
    sender: oneshot::Sender<CompletionRecord>,
    delivery: Delivery,
    waiters: usize,
}

struct Arrived {
    generation: u64,
    record: CompletionRecord,
    expires_at: Instant,
    _timer: ExpiryTimer,
}

struct Settled {
    generation: u64,
    reason: SettleReason,
    expires_at: Instant,
    _timer: ExpiryTimer,
}

enum Slot {
    Waiting(Waiting),
    Arrived(Arrived),
    Settled(Settled),
}

impl Slot {
    const fn generation(&self) -> u64 {
        match self {
            Self::Waiting(w) => w.generation,
            Self::Arrived(a) => a.generation,
            Self::Settled(s) => s.generation,
        }
    }
}

enum Claim {
    Ready(CompletionRecord),
    Wait { delivery: Delivery, generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaveReason {
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Left {
    /// Other callers still share the wait.
    Shared,
    /// This was the last caller; the entry is gone.
    Last,
    /// The entry was already resolved by a completion.
    Resolved,
}

struct Inner {
    shards: Box<[Mutex<Shard>]>,
    mask: usize,
    hasher: RandomState,
    generation: AtomicU64,
    config: RegistryConfig,
}

/// Registry correlating completion notifications with suspended callers.
///
/// Cheap to clone; clones share state. Construct one per process and hand it
/// to the notification listener and the orchestrator.
///
/// # Example
///
/// ```rust
/// use gateway_relay_core::{CompletionRecord, CorrelationId};
/// use gateway_relay_runtime::CorrelationRegistry;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = CorrelationRegistry::default();
/// let id = CorrelationId::parse("req-1")?;
///
/// let waiter = {
///     let registry = registry.clone();
///     let id = id.clone();
///     tokio::spawn(async move { registry.await_result(&id, Duration::from_secs(30)).await })
/// };
///
/// registry.complete(CompletionRecord::succeeded(id, serde_json::json!(42)));
/// let record = waiter.await??;
/// assert!(record.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CorrelationRegistry {
    inner: Arc<Inner>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("config", &self.inner.config)
            .field("shards", &self.inner.shards.len())
            .finish_non_exhaustive()
    }
}

impl CorrelationRegistry {
    /// Create a registry with the given configuration.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        let shard_count = config.shards.max(1).next_power_of_two();
        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        tracing::debug!(
            shards = shard_count,
            wait_timeout_ms = config.wait_timeout.as_millis(),
            retention_ms = config.retention.as_millis(),
            late_completion = %config.late_completion,
            "CorrelationRegistry created"
        );

        Self {
            inner: Arc::new(Inner {
                shards,
                mask: shard_count - 1,
                hasher: RandomState::new(),
                generation: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// The registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Wait for the result of `id`, up to `timeout`.
    ///
    /// Returns at once if the result already arrived. Otherwise suspends
    /// until [`complete`](Self::complete) delivers it or the timeout elapses.
    /// Concurrent calls for the same id share one pending delivery.
    ///
    /// Dropping the returned future (e.g. the client disconnected) withdraws
    /// the caller; a result arriving afterwards is parked as an early result.
    ///
    /// A `Failed` outcome is returned as `Ok`: the wait succeeded, the work
    /// did not.
    ///
    /// # Errors
    ///
    /// - [`AwaitError::Timeout`] if no result arrived in time
    /// - [`AwaitError::InvalidTimeout`] if `timeout` is zero
    /// - [`AwaitError::Closed`] if the pending delivery was torn down
    pub async fn await_result(
        &self,
        id: &CorrelationId,
        timeout: Duration,
    ) -> Result<CompletionRecord, AwaitError> {
        if timeout.is_zero() {
            return Err(AwaitError::InvalidTimeout);
        }

        let started = Instant::now();
        let (delivery, generation) = match self.inner.claim_or_register(id) {
            Claim::Ready(record) => {
                histogram!("relay_await_duration_seconds").record(0.0);
                return Ok(record);
            },
            Claim::Wait { delivery, generation } => (delivery, generation),
        };

        let mut guard = WaiterGuard {
            inner: &self.inner,
            id,
            generation,
            armed: true,
        };
        let probe = delivery.clone();

        let result = match tokio::time::timeout(timeout, delivery).await {
            Ok(Ok(record)) => {
                guard.armed = false;
                Ok(record)
            },
            Ok(Err(_)) => {
                guard.armed = false;
                Err(AwaitError::Closed { id: id.clone() })
            },
            Err(_) => {
                guard.armed = false;
                match self.inner.leave(id, generation, LeaveReason::TimedOut) {
                    // Resolved between the deadline and the lock: the record
                    // is already in the shared future.
                    Left::Resolved => match probe.now_or_never() {
                        Some(Ok(record)) => Ok(record),
                        _ => Err(AwaitError::Timeout { id: id.clone(), waited: timeout }),
                    },
                    Left::Shared | Left::Last => {
                        counter!("relay_await_timeouts_total").increment(1);
                        tracing::warn!(
                            correlation_id = %id,
                            timeout_ms = timeout.as_millis(),
                            "Timed out waiting for async result"
                        );
                        Err(AwaitError::Timeout { id: id.clone(), waited: timeout })
                    },
                }
            },
        };

        histogram!("relay_await_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    /// Wait for the result of `id` using the configured default timeout.
    ///
    /// # Errors
    ///
    /// Same as [`await_result`](Self::await_result).
    pub async fn await_default(&self, id: &CorrelationId) -> Result<CompletionRecord, AwaitError> {
        self.await_result(id, self.inner.config.wait_timeout).await
    }

    /// Deliver a completion record.
    ///
    /// Never blocks and never fails: hands the record to suspended callers,
    /// or parks it for the retention window, or drops it as a duplicate or
    /// late arrival. The return value reports which happened.
    pub fn complete(&self, record: CompletionRecord) -> CompleteOutcome {
        self.inner.complete(record)
    }

    /// Deliver a record addressed by a raw id, as received from the bus.
    ///
    /// An empty id, or one that does not match `record.id`, is logged and
    /// ignored.
    pub fn complete_raw(&self, id: &str, record: CompletionRecord) -> CompleteOutcome {
        if id.trim().is_empty() {
            tracing::warn!("Ignoring completion without correlation id");
            return CompleteOutcome::Rejected;
        }
        if id != record.id.as_str() {
            tracing::warn!(
                correlation_id = %id,
                record_id = %record.id,
                "Ignoring completion whose record id does not match"
            );
            return CompleteOutcome::Rejected;
        }
        self.inner.complete(record)
    }

    /// Current state of `id`.
    #[must_use]
    pub fn state(&self, id: &CorrelationId) -> CorrelationState {
        let shard = self.inner.shard(id);
        match shard.get(id) {
            None => CorrelationState::Unknown,
            Some(Slot::Waiting(w)) => CorrelationState::Waiting { waiters: w.waiters },
            Some(Slot::Arrived(_)) => CorrelationState::Arrived,
            Some(Slot::Settled(_)) => CorrelationState::Settled,
        }
    }

    /// Number of ids with suspended callers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.stats().pending
    }

    /// Number of parked early results.
    #[must_use]
    pub fn stored_count(&self) -> usize {
        self.stats().stored
    }

    /// Count entries by kind and publish them as gauges.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for shard in &*self.inner.shards {
            let shard = lock(shard);
            for slot in shard.values() {
                match slot {
                    Slot::Waiting(_) => stats.pending += 1,
                    Slot::Arrived(_) => stats.stored += 1,
                    Slot::Settled(_) => stats.settled += 1,
                }
            }
        }
        gauge!("relay_pending_waiters").set(stats.pending as f64);
        gauge!("relay_stored_results").set(stats.stored as f64);
        stats
    }

    /// Remove every parked result and marker whose retention has passed.
    ///
    /// Expiry timers normally do this; the sweep covers records completed
    /// outside a tokio runtime, where no timer could be started.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in &*self.inner.shards {
            let mut shard = lock(shard);
            shard.retain(|id, slot| match slot {
                Slot::Arrived(a) if a.expires_at <= now => {
                    log_discarded(id);
                    removed += 1;
                    false
                },
                Slot::Settled(s) if s.expires_at <= now => {
                    removed += 1;
                    false
                },
                _ => true,
            });
        }
        removed
    }
}

impl Inner {
    fn shard(&self, id: &CorrelationId) -> MutexGuard<'_, Shard> {
        #[allow(clippy::cast_possible_truncation)]
        let index = (self.hasher.hash_one(id.as_str()) as usize) & self.mask;
        lock(&self.shards[index])
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    fn claim_or_register(self: &Arc<Self>, id: &CorrelationId) -> Claim {
        let now = Instant::now();
        let mut shard = self.shard(id);

        match shard.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                if let Slot::Waiting(waiting) = occupied.get_mut() {
                    waiting.waiters += 1;
                    counter!("relay_waiters_coalesced_total").increment(1);
                    tracing::debug!(
                        correlation_id = %id,
                        waiters = waiting.waiters,
                        "Joined existing wait"
                    );
                    return Claim::Wait {
                        delivery: waiting.delivery.clone(),
                        generation: waiting.generation,
                    };
                }

                let (slot, wait) = self.new_waiting();
                match occupied.insert(slot) {
                    Slot::Arrived(arrived) if arrived.expires_at > now => {
                        // Parked result: hand it over and mark the id delivered.
                        let generation = self.next_generation();
                        occupied.insert(Slot::Settled(Settled {
                            generation,
                            reason: SettleReason::Delivered,
                            expires_at: now + self.config.retention,
                            _timer: self.schedule_expiry(id, generation),
                        }));
                        counter!("relay_results_claimed_early_total").increment(1);
                        tracing::info!(correlation_id = %id, "Claimed early result");
                        Claim::Ready(arrived.record)
                    },
                    Slot::Arrived(_) => {
                        log_discarded(id);
                        counter!("relay_waiters_registered_total").increment(1);
                        wait
                    },
                    Slot::Settled(_) | Slot::Waiting(_) => {
                        counter!("relay_waiters_registered_total").increment(1);
                        tracing::debug!(correlation_id = %id, "Registered waiter");
                        wait
                    },
                }
            },
            Entry::Vacant(vacant) => {
                let (slot, wait) = self.new_waiting();
                vacant.insert(slot);
                counter!("relay_waiters_registered_total").increment(1);
                tracing::debug!(correlation_id = %id, "Registered waiter");
                wait
            },
        }
    }

    fn new_waiting(&self) -> (Slot, Claim) {
        let (sender, receiver) = oneshot::channel();
        let delivery = receiver.shared();
        let generation = self.next_generation();
        let claim = Claim::Wait {
            delivery: delivery.clone(),
            generation,
        };
        let slot = Slot::Waiting(Waiting {
            generation,
            sender,
            delivery,
            waiters: 1,
        });
        (slot, claim)
    }

    fn complete(self: &Arc<Self>, record: CompletionRecord) -> CompleteOutcome {
        let id = record.id.clone();
        let now = Instant::now();
        let mut shard = self.shard(&id);

        match shard.entry(id.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(self.new_arrived(&id, record, now));
                counter!("relay_results_stored_total").increment(1);
                tracing::info!(correlation_id = %id, "Stored early result");
                CompleteOutcome::Stored
            },
            Entry::Occupied(mut occupied) => match occupied.get() {
                Slot::Waiting(_) => {
                    let generation = self.next_generation();
                    let settled = Slot::Settled(Settled {
                        generation,
                        reason: SettleReason::Delivered,
                        expires_at: now + self.config.retention,
                        _timer: self.schedule_expiry(&id, generation),
                    });
                    let Slot::Waiting(waiting) = occupied.insert(settled) else {
                        return CompleteOutcome::Rejected;
                    };
                    // Sent under the shard lock so a waiter that loses the
                    // race to its own deadline still finds the record.
                    let waiters = waiting.waiters;
                    if waiting.sender.send(record).is_err() {
                        tracing::warn!(correlation_id = %id, "Waiter vanished before hand-off");
                    }
                    counter!("relay_results_delivered_total").increment(1);
                    tracing::info!(correlation_id = %id, waiters, "Delivered async result");
                    CompleteOutcome::Delivered
                },
                Slot::Arrived(arrived) if arrived.expires_at <= now => {
                    log_discarded(&id);
                    occupied.insert(self.new_arrived(&id, record, now));
                    counter!("relay_results_stored_total").increment(1);
                    CompleteOutcome::Stored
                },
                Slot::Arrived(_) => {
                    counter!("relay_completions_duplicate_total").increment(1);
                    tracing::warn!(
                        correlation_id = %id,
                        "Duplicate completion ignored; keeping the first result"
                    );
                    CompleteOutcome::Duplicate
                },
                Slot::Settled(settled) => match settled.reason {
                    SettleReason::Delivered => {
                        counter!("relay_completions_duplicate_total").increment(1);
                        tracing::warn!(
                            correlation_id = %id,
                            "Duplicate completion for an already delivered id ignored"
                        );
                        CompleteOutcome::Duplicate
                    },
                    SettleReason::TimedOut => {
                        counter!("relay_completions_late_total").increment(1);
                        tracing::warn!(
                            correlation_id = %id,
                            success = record.is_success(),
                            "Completion arrived after its waiter timed out; dropped"
                        );
                        CompleteOutcome::Late
                    },
                },
            },
        }
    }

    fn new_arrived(self: &Arc<Self>, id: &CorrelationId, record: CompletionRecord, now: Instant) -> Slot {
        let generation = self.next_generation();
        Slot::Arrived(Arrived {
            generation,
            record,
            expires_at: now + self.config.retention,
            _timer: self.schedule_expiry(id, generation),
        })
    }

    fn leave(self: &Arc<Self>, id: &CorrelationId, generation: u64, reason: LeaveReason) -> Left {
        let mut shard = self.shard(id);
        let Entry::Occupied(mut occupied) = shard.entry(id.clone()) else {
            return Left::Resolved;
        };
        let Slot::Waiting(waiting) = occupied.get_mut() else {
            return Left::Resolved;
        };
        if waiting.generation != generation {
            return Left::Resolved;
        }

        waiting.waiters = waiting.waiters.saturating_sub(1);
        if waiting.waiters > 0 {
            return Left::Shared;
        }

        match (reason, self.config.late_completion) {
            (LeaveReason::TimedOut, LateCompletionPolicy::Drop) => {
                let generation = self.next_generation();
                occupied.insert(Slot::Settled(Settled {
                    generation,
                    reason: SettleReason::TimedOut,
                    expires_at: Instant::now() + self.config.retention,
                    _timer: self.schedule_expiry(id, generation),
                }));
            },
            (LeaveReason::TimedOut, LateCompletionPolicy::Retain) | (LeaveReason::Cancelled, _) => {
                occupied.remove();
            },
        }
        if reason == LeaveReason::Cancelled {
            tracing::debug!(correlation_id = %id, "Waiter withdrew");
        }
        Left::Last
    }

    /// Start the one-shot timer that removes the entry `generation` of `id`.
    fn schedule_expiry(self: &Arc<Self>, id: &CorrelationId, generation: u64) -> ExpiryTimer {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return ExpiryTimer(None);
        };
        let registry: Weak<Self> = Arc::downgrade(self);
        let id = id.clone();
        let deadline = Instant::now() + self.config.retention;
        let task = handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = registry.upgrade() {
                inner.expire(&id, generation);
            }
        });
        ExpiryTimer(Some(task.abort_handle()))
    }

    fn expire(&self, id: &CorrelationId, generation: u64) {
        let mut shard = self.shard(id);
        let Entry::Occupied(occupied) = shard.entry(id.clone()) else {
            return;
        };
        if occupied.get().generation() != generation {
            return;
        }
        match occupied.get() {
            Slot::Arrived(_) => {
                // Dropping the slot also drops its timer handle; this task is
                // finishing anyway.
                occupied.remove();
                log_discarded(id);
            },
            Slot::Settled(_) => {
                occupied.remove();
            },
            Slot::Waiting(_) => {},
        }
    }
}

fn log_discarded(id: &CorrelationId) {
    counter!("relay_results_expired_total").increment(1);
    tracing::warn!(correlation_id = %id, "Unclaimed async result discarded after retention window");
}

fn lock(shard: &Mutex<Shard>) -> MutexGuard<'_, Shard> {
    // Every mutation leaves the map consistent, so a poisoned lock is still usable.
    shard.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Withdraws a caller whose wait future is dropped before it finished.
struct WaiterGuard<'a> {
    inner: &'a Arc<Inner>,
    id: &'a CorrelationId,
    generation: u64,
    armed: bool,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.leave(self.id, self.generation, LeaveReason::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use gateway_relay_core::Outcome;
    use serde_json::json;

    fn id(raw: &str) -> CorrelationId {
        CorrelationId::parse(raw).unwrap()
    }

    fn registry() -> CorrelationRegistry {
        CorrelationRegistry::new(
            RegistryConfig::builder()
                .retention(Duration::from_secs(60))
                .shards(4)
                .build(),
        )
    }

    #[test]
    fn test_debug_does_not_touch_shards() {
        let registry = registry();
        let _held = lock(&registry.inner.shards[0]);
        let debug = format!("{registry:?}");
        assert!(debug.contains("CorrelationRegistry"));
        assert!(debug.contains("shards: 4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_first_then_completion() {
        let registry = registry();
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.await_result(&id("req-1"), Duration::from_secs(30)).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(registry.state(&id("req-1")), CorrelationState::Waiting { waiters: 1 });

        let outcome = registry.complete(CompletionRecord::succeeded(id("req-1"), json!(42)));
        assert_eq!(outcome, CompleteOutcome::Delivered);

        let record = waiter.await.unwrap().unwrap();
        assert_eq!(record.outcome, Outcome::Succeeded(json!(42)));
        assert_eq!(registry.pending_count(), 0);
        assert_eq!(registry.state(&id("req-1")), CorrelationState::Settled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_first_then_claim() {
        let registry = registry();
        assert_eq!(
            registry.complete(CompletionRecord::failed(id("req-2"), "boom")),
            CompleteOutcome::Stored
        );
        assert_eq!(registry.stored_count(), 1);

        let record = registry.await_result(&id("req-2"), Duration::from_secs(10)).await.unwrap();
        assert_eq!(record.outcome, Outcome::Failed("boom".to_string()));
        assert_eq!(registry.stored_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_is_rejected() {
        let registry = registry();
        let result = registry.await_result(&id("req"), Duration::ZERO).await;
        assert_eq!(result, Err(AwaitError::InvalidTimeout));
        assert_eq!(registry.state(&id("req")), CorrelationState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_settled_marker_that_expires() {
        let registry = registry();
        let result = registry.await_result(&id("req-t"), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(AwaitError::Timeout { .. })));
        assert_eq!(registry.state(&id("req-t")), CorrelationState::Settled);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(registry.state(&id("req-t")), CorrelationState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_withdraws_without_marker() {
        let registry = registry();
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.await_result(&id("req-c"), Duration::from_secs(30)).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(registry.pending_count(), 1);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(registry.state(&id("req-c")), CorrelationState::Unknown);

        // Falls back to early-result storage.
        assert_eq!(
            registry.complete(CompletionRecord::succeeded(id("req-c"), json!(1))),
            CompleteOutcome::Stored
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_raw_rejects_empty_and_mismatched_ids() {
        let registry = registry();
        let record = CompletionRecord::succeeded(id("req-r"), json!(null));
        assert_eq!(registry.complete_raw("", record.clone()), CompleteOutcome::Rejected);
        assert_eq!(registry.complete_raw("other", record.clone()), CompleteOutcome::Rejected);
        assert_eq!(registry.complete_raw("req-r", record), CompleteOutcome::Stored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_counts_each_kind() {
        let registry = registry();
        registry.complete(CompletionRecord::succeeded(id("a"), json!(1)));
        registry.complete(CompletionRecord::succeeded(id("b"), json!(2)));
        let _ = registry.await_result(&id("a"), Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.await_result(&id("c"), Duration::from_secs(30)).await })
        };
        tokio::task::yield_now().await;

        let stats = registry.stats();
        assert_eq!(stats, RegistryStats { pending: 1, stored: 1, settled: 1 });
        assert_eq!(stats.total(), 3);
        waiter.abort();
    }

    #[test]
    fn test_complete_outside_runtime_relies_on_sweep() {
        let registry = CorrelationRegistry::new(
            RegistryConfig::builder().retention(Duration::from_millis(1)).build(),
        );
        assert_eq!(
            registry.complete(CompletionRecord::succeeded(id("no-rt"), json!(1))),
            CompleteOutcome::Stored
        );
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(registry.purge_expired(), 1);
        assert_eq!(registry.stats().total(), 0);
    }
}
