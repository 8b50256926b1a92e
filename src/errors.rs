//! Error taxonomy shared across the dispatcher and broker gateway.

use std::error::Error as StdError;

use thiserror::Error;

/// Misconfiguration of the command processor or its registries.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A second handler was registered for a command that already has one.
    #[error("a handler is already registered for this command type")]
    DuplicateCommandHandler,
    /// No handler is registered for the command type being sent.
    #[error("no handler registered for this command type")]
    MissingCommandHandler,
    /// A second mapper was registered for a request type that already has one.
    #[error("a message mapper is already registered for this request type")]
    DuplicateMapper,
    /// No mapper is registered for the request type being posted.
    #[error("no message mapper registered for this request type")]
    MissingMapper,
    /// `post` was called without a producer configured.
    #[error("command processor has no producer configured")]
    MissingProducer,
    /// `post` was called without a mapper registry configured.
    #[error("command processor has no mapper registry configured")]
    MissingMapperRegistry,
    /// `post` was called without a message store configured.
    #[error("command processor has no message store configured")]
    MissingMessageStore,
}

/// Invariant violations while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// A mandatory header field was absent from a received message.
    #[error("missing required header field: {0}")]
    MissingHeaderField(&'static str),
    /// A message body carried bytes that are not valid UTF-8 text.
    #[error("message body is not valid UTF-8")]
    InvalidUtf8,
    /// A request could not be serialised to its wire representation.
    #[error("failed to serialise request body")]
    Serialize(#[source] serde_json::Error),
    /// A wire body could not be deserialised back into a request.
    #[error("failed to deserialise request body")]
    Deserialize(#[source] serde_json::Error),
    /// The outbox could not persist or retrieve a message.
    #[error("outbox storage operation failed")]
    Store(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

/// A broker operation failed after the retry policy was exhausted.
#[derive(Debug, Error)]
#[error("channel operation failed after exhausting retries")]
pub struct ChannelFailureError {
    #[source]
    pub(crate) source: Box<dyn StdError + Send + Sync + 'static>,
}

impl ChannelFailureError {
    /// Wrap the underlying transport error that exhausted the retry budget.
    #[must_use]
    pub fn new(source: impl StdError + Send + Sync + 'static) -> Self {
        Self { source: Box::new(source) }
    }
}

/// The circuit breaker is open and is rejecting calls until its reset
/// timeout elapses.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("circuit breaker is open")]
pub struct CircuitBrokenError;

/// Errors internal to the retry harness. Never crosses a public API: a
/// retry policy either resolves a transient failure by retrying or
/// escalates it to [`ChannelFailureError`].
#[derive(Debug, Error)]
pub(crate) enum TransientError {
    #[error("broker operation timed out")]
    Timeout,
    #[error("broker connection was reset")]
    ConnectionReset,
    #[error("broker channel limit exceeded")]
    LimitExceeded,
}

/// Umbrella error returned by [`crate::processor::CommandProcessor`]
/// operations.
#[derive(Debug, Error)]
pub enum BrightsideError {
    /// The processor or a registry was misconfigured for the operation.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A wire message invariant was violated.
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    /// The broker gateway exhausted its retry budget.
    #[error(transparent)]
    ChannelFailure(#[from] ChannelFailureError),
    /// The circuit breaker protecting a handler is open.
    #[error(transparent)]
    CircuitBroken(#[from] CircuitBrokenError),
    /// A handler returned an application-level error.
    #[error("handler failed")]
    Handler(#[source] Box<dyn StdError + Send + Sync + 'static>),
}
