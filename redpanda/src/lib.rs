//! Redpanda event bus for the gateway relay.
//!
//! Implements the [`EventBus`] trait from `gateway-relay-core` on top of
//! rdkafka, so any Kafka-compatible broker (Redpanda, Apache Kafka, MSK) can
//! carry completion notifications from the workers to the gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  produce (key = requestId)  ┌──────────────────┐
//! │    Worker    │ ──────────────────────────► │  async-result    │
//! └──────────────┘                             │  topic           │
//!                                              └────────┬─────────┘
//!                                                       │ consume (group)
//!                                                       ▼
//!                                              ┌──────────────────┐
//!                                              │ consumer task    │──► mpsc ──► MessageStream
//!                                              │ (manual commits) │
//!                                              └──────────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Offsets are committed AFTER the message reached the subscriber's channel
//! - If the process crashes before commit, the message is redelivered
//! - The registry ignores duplicate completions, so redelivery is harmless
//! - Keying by correlation id keeps every notification for one id on one partition
//!
//! **Configuration options**:
//! - `consumer_group`: Consumer group shared by gateway instances
//! - `buffer_size`: Message buffer (default: 1000) for handling bursts
//! - `auto_offset_reset`: Where to start reading (default: "latest")
//!
//! # Example
//!
//! ```no_run
//! use gateway_relay_redpanda::RedpandaEventBus;
//! use gateway_relay_core::{BusMessage, EventBus};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("gateway-relay")
//!     .build()?;
//!
//! let mut stream = event_bus.subscribe(&["async-result"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(message) => println!("{} bytes for {:?}", message.payload.len(), message.key),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use gateway_relay_core::{BusMessage, EventBus, EventBusError, MessageStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default subscriber buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default producer send timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redpanda event bus.
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Producer settings**: Acks, compression, timeout
/// - **Consumer group**: Explicit ID or derived from the subscribed topics
/// - **Buffer size**: Subscriber buffer capacity (default: 1000)
/// - **Offset reset**: Where new groups start reading (default: "latest")
///
/// # Example
///
/// ```no_run
/// use gateway_relay_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::new("localhost:9092")?;
///
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created from `brokers`.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Consumer group used by subscriptions to `topics`.
    #[must_use]
    pub fn consumer_group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("gateway-relay-{}", sorted.join("-"))
        })
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"1"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// Gateway instances sharing a group split the partitions between them.
    /// Each instance must then only wait on ids it issued itself, so a
    /// multi-instance deployment usually gives every instance its own group.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the number of messages buffered between the consumer and the subscriber.
    ///
    /// Default: 1000. Zero is rejected by [`build`](Self::build).
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Set where new consumer groups start reading: `"earliest"`, `"latest"` or `"error"`.
    ///
    /// Default: `"latest"`. Completions for requests issued before the
    /// gateway started have no waiter, so older messages are rarely useful.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Buffer size is zero
    /// - The producer cannot be created
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        if buffer_size == 0 {
            return Err(EventBusError::ConnectionFailed(
                "buffer_size must be greater than 0".to_string(),
            ));
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let acks = self.producer_acks.as_deref().unwrap_or("1");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "latest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        message: &'a BusMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let mut record = FutureRecord::<str, [u8]>::to(topic).payload(&message.payload);
            if let Some(key) = message.key.as_deref() {
                record = record.key(key);
            }

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic,
                        partition,
                        offset,
                        key = message.key.as_deref().unwrap_or(""),
                        "Message published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(topic, error = %kafka_error, "Failed to publish message");
                    Err(EventBusError::PublishFailed {
                        topic: topic.to_string(),
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let consumer_group_id = self.consumer_group_for(&topics);

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size = self.buffer_size,
                auto_offset_reset = %self.auto_offset_reset,
                manual_commit = true,
                "Subscribed to topics"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(self.buffer_size);
            tokio::spawn(consume(consumer, tx));

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as MessageStream)
        })
    }
}

/// Own the consumer and forward messages until the subscriber goes away.
///
/// An offset is committed only after its message was accepted by the
/// channel. Payload-less messages are reported and committed so they are not
/// redelivered forever.
async fn consume(
    consumer: StreamConsumer,
    tx: tokio::sync::mpsc::Sender<Result<BusMessage, EventBusError>>,
) {
    use futures::StreamExt;
    use rdkafka::consumer::CommitMode;

    let mut stream = consumer.stream();

    while let Some(msg_result) = stream.next().await {
        let message = match msg_result {
            Ok(message) => message,
            Err(e) => {
                let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                if tx.send(Err(err)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let item = match message.payload() {
            Some(payload) => {
                let key = message
                    .key()
                    .and_then(|k| std::str::from_utf8(k).ok())
                    .map(str::to_string);
                tracing::trace!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    key = key.as_deref().unwrap_or(""),
                    "Received message"
                );
                Ok(BusMessage {
                    topic: message.topic().to_string(),
                    key,
                    payload: payload.to_vec(),
                })
            }
            None => Err(EventBusError::DeserializationFailed(format!(
                "Message at {}/{}@{} has no payload",
                message.topic(),
                message.partition(),
                message.offset()
            ))),
        };

        if tx.send(item).await.is_err() {
            tracing::debug!("Channel receiver dropped, exiting consumer task");
            break;
        }

        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
            tracing::warn!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "Failed to commit offset (message may be redelivered)"
            );
        }
    }

    tracing::debug!("Consumer task exiting");
}
