//! The broker gateway: `Producer`/`Consumer` trait contracts a concrete
//! transport adapter implements, plus the bounded retry wrapper every
//! adapter gets for free.
//!
//! No concrete AMQP (or other) transport ships in this crate — `spec.md`
//! names that a non-goal. `Producer` and `Consumer` are the seam an
//! adapter crate implements, grounded on
//! `mxd::server::outbound::OutboundMessaging`'s `#[async_trait]` shape.

pub mod retry;

use std::time::Duration;

use async_trait::async_trait;

use crate::{errors::ChannelFailureError, message::WireMessage};
pub use retry::{Retriable, RetryPolicy};

/// The AMQP-style exchange kinds a [`BrokerConnection`] may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeType {
    /// Route by exact routing key match.
    Direct,
    /// Route to every bound queue, ignoring the routing key.
    Fanout,
    /// Route by routing-key pattern match.
    Topic,
    /// Route by header match rather than routing key.
    Headers,
}

/// Connection parameters for a broker exchange, supplied by the caller —
/// Brightside never parses configuration itself (`spec.md`'s "Config
/// source" collaborator interface).
#[derive(Debug, Clone)]
pub struct BrokerConnection {
    /// The broker connection URI.
    pub broker_uri: String,
    /// The exchange name messages are published to.
    pub exchange: String,
    /// The exchange's routing kind.
    pub exchange_type: ExchangeType,
    /// Whether the exchange survives a broker restart.
    pub durable: bool,
}

/// Sends wire messages to the broker.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Send a message to the broker.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelFailureError`] once the retry budget for this send
    /// is exhausted.
    async fn send(&self, message: &WireMessage) -> Result<(), ChannelFailureError>;
}

/// Receives wire messages from the broker and tracks delivery
/// acknowledgement.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Wait up to `timeout` for the next delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelFailureError`] once the retry budget for this
    /// receive is exhausted.
    async fn receive(&self, timeout: Duration) -> Result<Option<WireMessage>, ChannelFailureError>;

    /// Acknowledge a delivered message, confirming it need not be
    /// redelivered.
    fn acknowledge(&self, message: &WireMessage);

    /// Report whether `message` is the most recently delivered message and
    /// has been acknowledged (`spec.md` §9's corrected semantics — not the
    /// source's inverted branch, which reported acknowledgement for any
    /// message id *other* than the last one).
    fn has_acknowledged(&self, message: &WireMessage) -> bool;

    /// Discard all messages currently queued at the broker for this
    /// consumer without dispatching them.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelFailureError`] once the retry budget for this
    /// purge is exhausted.
    async fn purge(&self) -> Result<(), ChannelFailureError>;
}

/// The low-level operations a concrete transport adapter implements,
/// before the bounded retry policy is applied. [`BoundedRetryProducer`]
/// and [`BoundedRetryConsumer`] lift a `RawProducer`/`RawConsumer` into a
/// full [`Producer`]/[`Consumer`].
#[async_trait]
pub trait RawProducer: Send + Sync {
    /// The transport-level error this adapter can fail with.
    type Error: Retriable;

    /// Publish a message, without any retry applied.
    async fn publish(&self, message: &WireMessage) -> Result<(), Self::Error>;
}

/// See [`RawProducer`].
#[async_trait]
pub trait RawConsumer: Send + Sync {
    /// The transport-level error this adapter can fail with.
    type Error: Retriable;

    /// Poll for the next delivery, without any retry applied. Returns
    /// `None` on a plain timeout (not an error).
    async fn poll(&self, timeout: Duration) -> Result<Option<WireMessage>, Self::Error>;

    /// Acknowledge a delivered message.
    fn acknowledge(&self, message: &WireMessage);

    /// Report whether `message` is the last-delivered, acknowledged
    /// message.
    fn has_acknowledged(&self, message: &WireMessage) -> bool;

    /// Purge queued messages, without any retry applied.
    async fn purge_queue(&self) -> Result<(), Self::Error>;
}

/// Wraps a [`RawProducer`] with [`RetryPolicy`] to implement [`Producer`].
pub struct BoundedRetryProducer<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: RawProducer> BoundedRetryProducer<T> {
    /// Wrap `inner` with `policy`.
    #[must_use]
    pub const fn new(inner: T, policy: RetryPolicy) -> Self { Self { inner, policy } }
}

#[async_trait]
impl<T: RawProducer> Producer for BoundedRetryProducer<T> {
    async fn send(&self, message: &WireMessage) -> Result<(), ChannelFailureError> {
        self.policy.run(|| self.inner.publish(message)).await
    }
}

/// Wraps a [`RawConsumer`] with [`RetryPolicy`] to implement [`Consumer`].
pub struct BoundedRetryConsumer<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: RawConsumer> BoundedRetryConsumer<T> {
    /// Wrap `inner` with `policy`.
    #[must_use]
    pub const fn new(inner: T, policy: RetryPolicy) -> Self { Self { inner, policy } }
}

#[async_trait]
impl<T: RawConsumer> Consumer for BoundedRetryConsumer<T> {
    async fn receive(&self, timeout: Duration) -> Result<Option<WireMessage>, ChannelFailureError> {
        self.policy.run(|| self.inner.poll(timeout)).await
    }

    fn acknowledge(&self, message: &WireMessage) { self.inner.acknowledge(message) }

    fn has_acknowledged(&self, message: &WireMessage) -> bool { self.inner.has_acknowledged(message) }

    async fn purge(&self) -> Result<(), ChannelFailureError> {
        self.policy.run(|| self.inner.purge_queue()).await
    }
}
