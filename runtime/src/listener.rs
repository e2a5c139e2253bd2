//! Bus-to-registry notification listener.
//!
//! Subscribes to the completion topic and feeds every message into the
//! [`CorrelationRegistry`]. Malformed messages are logged and skipped; the
//! listener never stops because of one bad payload.
//!
//! # Example
//!
//! ```rust,ignore
//! let listener = NotificationListener::spawn(bus, "async-result", registry.clone()).await?;
//! // ...
//! listener.shutdown().await;
//! ```

use crate::registry::{CompleteOutcome, CorrelationRegistry};
use crate::HealthCheck;
use futures::StreamExt;
use gateway_relay_core::{
    CompletionMessage, CompletionRecord, EventBus, EventBusError, MalformedNotification,
    MessageStream,
};
use metrics::counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pause after a transport error or a lost subscription.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Background task that turns bus messages into registry completions.
///
/// The task is aborted by [`shutdown`](Self::shutdown) or when the listener
/// is dropped.
pub struct NotificationListener {
    topic: String,
    connected: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl NotificationListener {
    /// Subscribe to `topic` and start forwarding completions to `registry`.
    ///
    /// The subscription is made before this returns, so a broker that is down
    /// at startup is reported here rather than in the background.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] if the initial subscription fails.
    pub async fn spawn(
        bus: Arc<dyn EventBus>,
        topic: impl Into<String>,
        registry: CorrelationRegistry,
    ) -> Result<Self, EventBusError> {
        let topic = topic.into();
        let stream = bus.subscribe(&[topic.as_str()]).await?;
        let connected = Arc::new(AtomicBool::new(true));

        tracing::info!(topic = %topic, "Notification listener subscribed");

        let task = tokio::spawn(run(
            bus,
            topic.clone(),
            registry,
            stream,
            Arc::clone(&connected),
        ));

        Ok(Self {
            topic,
            connected,
            task: Some(task),
        })
    }

    /// Decode one raw notification and hand it to `registry`.
    ///
    /// Exposed so the decoding path can be exercised without a bus.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedNotification`] if the payload is not a usable
    /// completion message. The registry is untouched in that case.
    pub fn handle_payload(
        registry: &CorrelationRegistry,
        payload: &[u8],
    ) -> Result<CompleteOutcome, MalformedNotification> {
        let message = CompletionMessage::from_json(payload)?;
        let record = CompletionRecord::try_from(message)?;
        tracing::debug!(
            correlation_id = %record.id,
            success = record.is_success(),
            source = record.source.as_deref().unwrap_or("unknown"),
            "Received completion notification"
        );
        Ok(registry.complete(record))
    }

    /// Topic this listener consumes.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the background task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Health of the listener: unhealthy if the task died, degraded while
    /// recovering from a transport error.
    #[must_use]
    pub fn health_check(&self) -> HealthCheck {
        let check = if !self.is_running() {
            HealthCheck::unhealthy("notification_listener", "listener task is not running")
        } else if self.connected.load(Ordering::Relaxed) {
            HealthCheck::healthy("notification_listener")
        } else {
            HealthCheck::degraded("notification_listener", "recovering from bus error")
        };
        check.with_metadata("topic", &self.topic)
    }

    /// Stop the background task and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            tracing::info!(topic = %self.topic, "Notification listener stopped");
        }
    }
}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    bus: Arc<dyn EventBus>,
    topic: String,
    registry: CorrelationRegistry,
    mut stream: MessageStream,
    connected: Arc<AtomicBool>,
) {
    loop {
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => {
                    connected.store(true, Ordering::Relaxed);
                    counter!("relay_notifications_received_total").increment(1);
                    if let Err(e) = NotificationListener::handle_payload(&registry, &message.payload) {
                        counter!("relay_notifications_malformed_total").increment(1);
                        tracing::warn!(
                            topic = %message.topic,
                            key = message.key.as_deref().unwrap_or(""),
                            error = %e,
                            "Skipping malformed completion notification"
                        );
                    }
                }
                Err(EventBusError::DeserializationFailed(reason)) => {
                    counter!("relay_notifications_malformed_total").increment(1);
                    tracing::warn!(topic = %topic, reason = %reason, "Skipping unreadable bus message");
                }
                Err(e) => {
                    connected.store(false, Ordering::Relaxed);
                    tracing::error!(topic = %topic, error = %e, "Bus error, backing off");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }

        // The stream only ends if the consumer went away; subscribe again.
        connected.store(false, Ordering::Relaxed);
        tracing::warn!(topic = %topic, "Subscription ended, resubscribing");
        loop {
            tokio::time::sleep(RECONNECT_BACKOFF).await;
            match bus.subscribe(&[topic.as_str()]).await {
                Ok(next) => {
                    stream = next;
                    connected.store(true, Ordering::Relaxed);
                    tracing::info!(topic = %topic, "Notification listener resubscribed");
                    break;
                }
                Err(e) => {
                    tracing::error!(topic = %topic, error = %e, "Resubscribe failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use gateway_relay_core::{CorrelationId, Outcome};
    use serde_json::json;

    fn payload(value: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_payload_stores_early_result() {
        let registry = CorrelationRegistry::default();
        let outcome = NotificationListener::handle_payload(
            &registry,
            &payload(&json!({ "requestId": "req-1", "status": "completed", "data": [1, 2] })),
        )
        .unwrap();
        assert_eq!(outcome, CompleteOutcome::Stored);

        let id = CorrelationId::parse("req-1").unwrap();
        let record = registry.await_result(&id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(record.outcome, Outcome::Succeeded(json!([1, 2])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_payload_rejects_garbage_without_touching_registry() {
        let registry = CorrelationRegistry::default();
        assert!(NotificationListener::handle_payload(&registry, b"{not json").is_err());
        assert_eq!(
            NotificationListener::handle_payload(&registry, &payload(&json!({ "status": "completed" }))),
            Err(MalformedNotification::MissingId)
        );
        assert_eq!(registry.stats().total(), 0);
    }
}
