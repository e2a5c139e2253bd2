//! Message bus abstraction for completion notifications.
//!
//! Downstream workers report finished work by publishing a JSON
//! [`CompletionMessage`](crate::CompletionMessage) to a topic. The gateway
//! subscribes to that topic and forwards every message to the correlation
//! registry. This module provides the [`EventBus`] trait both sides use.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   publish    ┌──────────────┐   subscribe   ┌──────────────┐
//! │    Worker    │ ───────────► │  async-result│ ────────────► │   Listener   │
//! │  (consumer)  │              │    topic     │               │  (gateway)   │
//! └──────────────┘              └──────────────┘               └──────┬───────┘
//!                                                                     │ complete()
//!                                                                     ▼
//!                                                              ┌──────────────┐
//!                                                              │   Registry   │
//!                                                              └──────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **Raw payloads**: the bus moves bytes; decoding belongs to the listener
//! - **At-least-once delivery**: a message may arrive more than once
//! - **Idempotency**: the registry ignores duplicate completions for an id
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (gateway-relay-testing) - For testing
//! - `RedpandaEventBus` (gateway-relay-redpanda) - For production (Kafka-compatible)
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let mut stream = event_bus.subscribe(&["async-result"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(message) => listener.handle_payload(&message.payload),
//!         Err(e) => tracing::error!(error = %e, "Bus error"),
//!     }
//! }
//! ```

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A delivered message could not be read
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A single message as carried by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Partition key (the correlation id, when the producer sets one).
    pub key: Option<String>,
    /// Raw payload bytes (JSON for completion messages).
    pub payload: Vec<u8>,
}

impl BusMessage {
    /// Create a message for `topic` with the given payload.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload,
        }
    }

    /// Set the partition key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Stream of messages from a subscription.
///
/// Each item is a `Result`: transport and read errors are surfaced in-band so
/// a single bad message does not end the subscription.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<BusMessage, EventBusError>> + Send>>;

/// Trait for message bus implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the listener task and the test
/// publishers share one bus handle.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be used as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish a message to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        message: &'a BusMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>>;

    /// Subscribe to one or more topics and receive a stream of messages.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>>;
}
