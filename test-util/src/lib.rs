#![expect(clippy::expect_used, reason = "fakes only ever lock their own uncontended mutexes")]

//! Shared test doubles for Brightside's command processor and broker
//! gateway, mirroring both `mxd`'s own `test-util` crate and the original
//! Python source's dedicated `handlers_testdoubles.py`/`messaging_testdoubles.py`
//! modules.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use brightside::{
    broker::{Consumer, Producer},
    errors::{ChannelFailureError, MessagingError},
    message::{MessageId, WireMessage},
    store::MessageStore,
};
use tokio::sync::Mutex as AsyncMutex;

/// A [`Producer`] that records every message it is asked to send.
#[derive(Default)]
pub struct FakeProducer {
    sent: Mutex<Vec<WireMessage>>,
    fail_next: Mutex<bool>,
}

impl FakeProducer {
    /// Create a producer with nothing sent yet.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Arrange for the next `send` call to fail with
    /// [`ChannelFailureError`].
    pub fn fail_next_send(&self) { *self.fail_next.lock().expect("lock poisoned") = true; }

    /// The messages sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<WireMessage> { self.sent.lock().expect("lock poisoned").clone() }
}

#[async_trait]
impl Producer for FakeProducer {
    async fn send(&self, message: &WireMessage) -> Result<(), ChannelFailureError> {
        let mut fail_next = self.fail_next.lock().expect("lock poisoned");
        if *fail_next {
            *fail_next = false;
            return Err(ChannelFailureError::new(FakeTransportError));
        }
        drop(fail_next);
        self.sent.lock().expect("lock poisoned").push(message.clone());
        Ok(())
    }
}

/// A [`Consumer`] backed by an in-process queue a test can seed ahead of
/// time, tracking the last delivered and last acknowledged message id.
#[derive(Default)]
pub struct FakeConsumer {
    queue: AsyncMutex<VecDeque<WireMessage>>,
    last_delivered: Mutex<Option<MessageId>>,
    acknowledged: Mutex<Option<MessageId>>,
}

impl FakeConsumer {
    /// Create a consumer with an empty queue.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Seed a message onto the consumer's queue, to be delivered on a
    /// future `receive`.
    pub async fn enqueue(&self, message: WireMessage) { self.queue.lock().await.push_back(message); }
}

#[async_trait]
impl Consumer for FakeConsumer {
    async fn receive(&self, _timeout: Duration) -> Result<Option<WireMessage>, ChannelFailureError> {
        let message = self.queue.lock().await.pop_front();
        if let Some(message) = &message {
            *self.last_delivered.lock().expect("lock poisoned") = Some(message.id());
        }
        Ok(message)
    }

    fn acknowledge(&self, message: &WireMessage) {
        *self.acknowledged.lock().expect("lock poisoned") = Some(message.id());
    }

    fn has_acknowledged(&self, message: &WireMessage) -> bool {
        let last_delivered = *self.last_delivered.lock().expect("lock poisoned");
        let acknowledged = *self.acknowledged.lock().expect("lock poisoned");
        last_delivered == Some(message.id()) && acknowledged == Some(message.id())
    }

    async fn purge(&self) -> Result<(), ChannelFailureError> {
        self.queue.lock().await.clear();
        Ok(())
    }
}

/// A [`MessageStore`] over a plain in-process map, for tests that want to
/// assert on exactly what was persisted without pulling in Diesel.
#[derive(Default)]
pub struct FakeMessageStore {
    messages: AsyncMutex<HashMap<MessageId, WireMessage>>,
}

impl FakeMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// The number of messages currently stored.
    pub async fn len(&self) -> usize { self.messages.lock().await.len() }
}

#[async_trait]
impl MessageStore for FakeMessageStore {
    async fn add(&self, message: WireMessage) -> Result<(), MessagingError> {
        self.messages.lock().await.insert(message.id(), message);
        Ok(())
    }

    async fn get_message(&self, id: MessageId) -> Option<WireMessage> {
        self.messages.lock().await.get(&id).cloned()
    }
}

/// The error [`FakeProducer`] raises when told to fail its next send.
#[derive(Debug, thiserror::Error)]
#[error("fake transport failure")]
pub struct FakeTransportError;
