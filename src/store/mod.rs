//! The outbox: durable storage for messages en route to the broker.
//!
//! `spec.md` §4.3 requires `post` to persist a message before handing it to
//! the producer, so a crash between the two never silently drops work.
//! [`InMemoryMessageStore`] is a non-durable fake for tests and for callers
//! that accept weaker guarantees; the `sqlite`/`postgres`-gated
//! [`diesel_store`] module provides the durable backend, mirroring
//! `mxd::db`'s connection-pool-plus-migrations shape.

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod diesel_store;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{errors::MessagingError, message::{MessageId, WireMessage}};

/// Durable storage for outbound messages, keyed by message id.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message before it is handed to a [`crate::broker::Producer`].
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError`] if the message cannot be persisted.
    async fn add(&self, message: WireMessage) -> Result<(), MessagingError>;

    /// Retrieve a previously stored message by id, if it is still present.
    async fn get_message(&self, id: MessageId) -> Option<WireMessage>;
}

/// A non-durable, in-process [`MessageStore`] backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<HashMap<MessageId, WireMessage>>,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn add(&self, message: WireMessage) -> Result<(), MessagingError> {
        self.messages.lock().await.insert(message.id(), message);
        Ok(())
    }

    async fn get_message(&self, id: MessageId) -> Option<WireMessage> {
        self.messages.lock().await.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::message::{MessageType, WireBody, WireHeader};

    fn message() -> WireMessage {
        WireMessage::new(
            WireHeader::new(MessageId::new(), "orders.create", MessageType::Command, None, None, "text/plain"),
            WireBody::from_text("payload", "text/plain"),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn stored_message_is_retrievable_by_id() {
        let store = InMemoryMessageStore::new();
        let message = message();
        let id = message.id();

        store.add(message).await.expect("add succeeds");

        let fetched = store.get_message(id).await.expect("message present");
        assert_eq!(fetched.id(), id);
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_id_is_absent() {
        let store = InMemoryMessageStore::new();
        assert!(store.get_message(MessageId::new()).await.is_none());
    }
}
