//! Mock implementations of the gateway's boundary traits.
//!
//! - [`InMemoryEventBus`]: broadcast-channel bus for listener tests
//! - [`MockBackend`]: scripted backend that can publish completions

use async_stream::stream;
use futures::stream::{self, StreamExt};
use gateway_relay_core::{
    Acceptance, AsyncBackend, BackendCall, BackendError, BusMessage, CompletionMessage,
    CompletionRecord, CorrelationId, EventBus, EventBusError, MessageStream, Outcome,
};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

type Item = Result<BusMessage, EventBusError>;

/// In-memory event bus backed by one tokio broadcast channel per topic.
///
/// A published message reaches the subscribers present at publish time only,
/// like a consumer group that starts at the latest offset.
///
/// # Example
///
/// ```
/// use gateway_relay_core::{BusMessage, EventBus};
/// use gateway_relay_testing::mocks::InMemoryEventBus;
/// use futures::StreamExt;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// let mut stream = bus.subscribe(&["async-result"]).await.unwrap();
///
/// let message = BusMessage::new("async-result", b"{}".to_vec());
/// bus.publish("async-result", &message).await.unwrap();
///
/// assert_eq!(stream.next().await.unwrap().unwrap(), message);
/// # });
/// ```
#[derive(Debug)]
pub struct InMemoryEventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<Item>>>,
    capacity: usize,
    published: AtomicUsize,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Create a bus with the default per-topic buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with the given per-topic buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            published: AtomicUsize::new(0),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Item> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Deliver an error to the subscribers of `topic`, as a broker would on a
    /// transport failure.
    pub fn inject_error(&self, topic: &str, error: EventBusError) {
        let _ = self.sender(topic).send(Err(error));
    }

    /// End every live subscription on `topic`, as a broker does when it drops
    /// a consumer. Later subscriptions get a fresh channel.
    pub fn close_topic(&self, topic: &str) {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic);
    }

    /// Number of messages published so far.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.sender(topic).receiver_count()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        message: &'a BusMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            // No subscribers is not an error: the message is simply lost.
            let _ = self.sender(topic).send(Ok(message.clone()));
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>> {
        let receivers: Vec<_> = topics.iter().map(|topic| self.sender(topic).subscribe()).collect();

        Box::pin(async move {
            if receivers.is_empty() {
                return Err(EventBusError::SubscriptionFailed {
                    topics: Vec::new(),
                    reason: "no topics given".to_string(),
                });
            }

            let streams = receivers.into_iter().map(|mut receiver| {
                stream! {
                    loop {
                        match receiver.recv().await {
                            Ok(item) => yield item,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                yield Err(EventBusError::TransportError(format!(
                                    "subscriber lagged, {skipped} messages skipped"
                                )));
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
                .boxed()
            });

            let merged: MessageStream = Box::pin(stream::select_all(streams));
            Ok(merged)
        })
    }
}

#[derive(Debug, Clone)]
enum Script {
    Accept {
        id: String,
        completion: Option<(Outcome, Duration)>,
    },
    Reply(Acceptance),
    Fail(BackendError),
}

struct Publisher {
    bus: Arc<dyn EventBus>,
    topic: String,
}

/// Scripted [`AsyncBackend`].
///
/// Each `submit` consumes the next scripted response in order. An accepted
/// response can also schedule the matching completion on a bus, which lets a
/// test drive the whole path: backend, bus, listener, registry.
///
/// A completion scheduled with a zero delay is published before `submit`
/// returns, so it reaches the registry ahead of the caller.
pub struct MockBackend {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<BackendCall>>,
    publisher: Option<Publisher>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a backend with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            publisher: None,
        }
    }

    /// Publish scheduled completions to `topic` on `bus`.
    #[must_use]
    pub fn publishing_to(mut self, bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        self.publisher = Some(Publisher {
            bus,
            topic: topic.into(),
        });
        self
    }

    fn push(&self, script: Script) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script);
    }

    /// Accept the next call with `id`; no completion follows.
    #[must_use]
    pub fn accept(self, id: impl Into<String>) -> Self {
        self.push(Script::Accept {
            id: id.into(),
            completion: None,
        });
        self
    }

    /// Accept the next call with `id` and publish `outcome` after `delay`.
    #[must_use]
    pub fn accept_and_complete(self, id: impl Into<String>, outcome: Outcome, delay: Duration) -> Self {
        self.push(Script::Accept {
            id: id.into(),
            completion: Some((outcome, delay)),
        });
        self
    }

    /// Answer the next call with `acknowledgement` as is.
    #[must_use]
    pub fn reply(self, acknowledgement: Acceptance) -> Self {
        self.push(Script::Reply(acknowledgement));
        self
    }

    /// Fail the next call with `error`.
    #[must_use]
    pub fn fail(self, error: BackendError) -> Self {
        self.push(Script::Fail(error));
        self
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn publish_completion(&self, id: &str, outcome: Outcome, delay: Duration) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let Ok(id) = CorrelationId::parse(id) else {
            return;
        };
        let record = CompletionRecord {
            id,
            outcome,
            source: Some("mock-backend".to_string()),
            produced_at: None,
        };
        let Ok(payload) = CompletionMessage::from(&record).to_json() else {
            return;
        };
        let message = BusMessage::new(publisher.topic.clone(), payload).with_key(record.id.as_str());

        if delay.is_zero() {
            if let Err(e) = publisher.bus.publish(&publisher.topic, &message).await {
                tracing::warn!(error = %e, "Mock backend failed to publish completion");
            }
            return;
        }

        let bus = Arc::clone(&publisher.bus);
        let topic = publisher.topic.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = bus.publish(&topic, &message).await {
                tracing::warn!(error = %e, "Mock backend failed to publish completion");
            }
        });
    }
}

impl AsyncBackend for MockBackend {
    fn submit(
        &self,
        call: BackendCall,
    ) -> Pin<Box<dyn Future<Output = Result<Acceptance, BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
            let next = self
                .script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();

            match next {
                Some(Script::Accept { id, completion }) => {
                    if let Some((outcome, delay)) = completion {
                        self.publish_completion(&id, outcome, delay).await;
                    }
                    Ok(Acceptance::accepted(id))
                }
                Some(Script::Reply(acknowledgement)) => Ok(acknowledgement),
                Some(Script::Fail(error)) => Err(error),
                None => Err(BackendError::InvalidResponse(
                    "no scripted response left".to_string(),
                )),
            }
        })
    }
}
