//! The channel: a buffered bridge between a broker [`Consumer`] and a
//! [`crate::pump::MessagePump`].
//!
//! Grounded on `original_source/Brightside/core/channels.py`'s `Channel`:
//! an internal FIFO queue that `stop()` feeds a quit sentinel into, ahead
//! of whatever the consumer itself still has queued, so the pump drains
//! its backlog of already-buffered work and then unwinds on its own next
//! iteration rather than being killed mid-dispatch.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tracing::debug;

use crate::{broker::Consumer, errors::ChannelFailureError, message::WireMessage};

/// The channel's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Constructed but not yet read from.
    Initialized,
    /// At least one `receive` has been served.
    Started,
    /// `stop()` has been called; a quit sentinel is queued.
    Stopping,
}

/// Buffers deliveries ahead of the broker consumer and injects the quit
/// sentinel that unwinds a [`crate::pump::MessagePump`].
pub struct Channel {
    name: String,
    consumer: Arc<dyn Consumer>,
    queue: Mutex<VecDeque<WireMessage>>,
    state: Mutex<ChannelState>,
}

impl Channel {
    /// Create a channel over `consumer`.
    #[must_use]
    pub fn new(name: impl Into<String>, consumer: Arc<dyn Consumer>) -> Self {
        Self { name: name.into(), consumer, queue: Mutex::new(VecDeque::new()), state: Mutex::new(ChannelState::Initialized) }
    }

    /// The channel's name, used for logging and diagnostics.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// The channel's current lifecycle state.
    pub async fn state(&self) -> ChannelState { *self.state.lock().await }

    /// The number of messages currently buffered in the internal queue
    /// (not counting anything still queued at the broker).
    pub async fn length(&self) -> usize { self.queue.lock().await.len() }

    /// Receive the next message: drain the internal queue first, falling
    /// back to the broker consumer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelFailureError`] if the consumer's retry budget is
    /// exhausted.
    pub async fn receive(&self, timeout: Duration) -> Result<Option<WireMessage>, ChannelFailureError> {
        {
            let mut state = self.state.lock().await;
            if *state == ChannelState::Initialized {
                *state = ChannelState::Started;
            }
        }

        if let Some(message) = self.queue.lock().await.pop_front() {
            return Ok(Some(message));
        }

        self.consumer.receive(timeout).await
    }

    /// Acknowledge a delivered message with the underlying consumer.
    pub fn acknowledge(&self, message: &WireMessage) { self.consumer.acknowledge(message) }

    /// Enqueue the quit sentinel and transition to
    /// [`ChannelState::Stopping`]. The broker consumer's own queue is left
    /// untouched: the sentinel is served first on the next `receive`, and
    /// any broker-side backlog is simply never drained by this channel
    /// again.
    pub async fn stop(&self) {
        debug!(channel = self.name, "queuing quit sentinel");
        self.queue.lock().await.push_back(WireMessage::quit());
        *self.state.lock().await = ChannelState::Stopping;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;
    use crate::message::MessageType;

    #[derive(Default)]
    struct FakeConsumer {
        queued: Mutex<VecDeque<WireMessage>>,
    }

    #[async_trait]
    impl Consumer for FakeConsumer {
        async fn receive(&self, _timeout: Duration) -> Result<Option<WireMessage>, ChannelFailureError> {
            Ok(self.queued.lock().await.pop_front())
        }

        fn acknowledge(&self, _message: &WireMessage) {}

        fn has_acknowledged(&self, _message: &WireMessage) -> bool { false }

        async fn purge(&self) -> Result<(), ChannelFailureError> {
            self.queued.lock().await.clear();
            Ok(())
        }
    }

    #[rstest]
    #[tokio::test]
    async fn stop_enqueues_quit_ahead_of_consumer_backlog() {
        let consumer = Arc::new(FakeConsumer::default());
        consumer.queued.lock().await.push_back(WireMessage::quit());
        let channel = Channel::new("orders", consumer.clone());

        channel.stop().await;
        assert_eq!(channel.state().await, ChannelState::Stopping);

        let received = channel.receive(Duration::from_millis(10)).await.expect("receive ok");
        assert_eq!(received.expect("message").header().message_type(), MessageType::Quit);
        assert_eq!(consumer.queued.lock().await.len(), 1, "consumer's own backlog is untouched");
    }

    #[rstest]
    #[tokio::test]
    async fn receive_transitions_to_started() {
        let consumer = Arc::new(FakeConsumer::default());
        let channel = Channel::new("orders", consumer);
        assert_eq!(channel.state().await, ChannelState::Initialized);

        let _ = channel.receive(Duration::from_millis(10)).await;
        assert_eq!(channel.state().await, ChannelState::Started);
    }
}
