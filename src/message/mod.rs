//! The wire message model: the immutable envelope that crosses the broker
//! boundary.
//!
//! A [`WireMessage`] pairs a [`WireHeader`] (routing and correlation
//! metadata) with a [`WireBody`] (an opaque payload plus its declared
//! content type). Neither exposes a setter once built; building a new
//! message is the only way to change one, matching `spec.md` §3's identity
//! invariant.

pub mod factory;

use std::fmt;

use uuid::Uuid;

use crate::errors::MessagingError;

/// Identity of a wire message, distinct from [`crate::request::RequestId`]
/// even though both are 128-bit UUIDs: a request may be relayed as several
/// wire messages over its lifetime (retries, mapper re-encoding), each with
/// its own message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh, random message identity.
    #[must_use]
    pub fn new() -> Self { Self(Uuid::new_v4()) }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid { self.0 }
}

impl Default for MessageId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self { Self(id) }
}

/// Correlates a message with the request (or prior message) that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Wrap an existing UUID as a correlation identity.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self { Self(id) }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid { self.0 }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self { Self(id) }
}

/// The kind of payload a wire message carries, per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// The message failed to parse into a recognisable shape and must not
    /// be dispatched.
    Unacceptable,
    /// A recognisable but otherwise uninteresting message (no topic-bound
    /// handler is expected to act on it).
    None,
    /// A command: dispatched to exactly one handler.
    Command,
    /// An event: dispatched to an ordered list of handlers.
    Event,
    /// The internal sentinel a channel enqueues to unwind its message pump.
    Quit,
}

impl MessageType {
    /// The canonical wire representation of this variant, per `spec.md`
    /// §6's textual header keys.
    #[must_use]
    pub const fn as_wire_str(self) -> &'static str {
        match self {
            Self::Unacceptable => "unacceptable",
            Self::None => "none",
            Self::Command => "command",
            Self::Event => "event",
            Self::Quit => "quit",
        }
    }

    /// Parse the canonical wire representation, defaulting to
    /// [`MessageType::Unacceptable`] for anything unrecognised (Postel's
    /// law: be liberal in what a [`factory::ParseFactory`] accepts, but
    /// never promote unrecognised input to a dispatchable type).
    #[must_use]
    pub fn from_wire_str(s: &str) -> Self {
        match s {
            "none" => Self::None,
            "command" => Self::Command,
            "event" => Self::Event,
            "quit" => Self::Quit,
            _ => Self::Unacceptable,
        }
    }
}

/// Routing and correlation metadata for a wire message.
#[derive(Debug, Clone)]
pub struct WireHeader {
    id: MessageId,
    topic: String,
    message_type: MessageType,
    correlation_id: Option<CorrelationId>,
    reply_to: Option<String>,
    content_type: String,
}

impl WireHeader {
    /// Build a header. `content_type` defaults to `"text/plain"` when
    /// empty, matching the source's default serialiser.
    #[must_use]
    pub fn new(
        id: MessageId,
        topic: impl Into<String>,
        message_type: MessageType,
        correlation_id: Option<CorrelationId>,
        reply_to: Option<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let content_type = content_type.into();
        Self {
            id,
            topic: topic.into(),
            message_type,
            correlation_id,
            reply_to,
            content_type: if content_type.is_empty() { "text/plain".to_owned() } else { content_type },
        }
    }

    /// The message identity.
    #[must_use]
    pub const fn id(&self) -> MessageId { self.id }

    /// The routing topic.
    #[must_use]
    pub fn topic(&self) -> &str { &self.topic }

    /// The message type.
    #[must_use]
    pub const fn message_type(&self) -> MessageType { self.message_type }

    /// The correlation identity, if one was supplied. Absence is
    /// represented as `None`, never an empty string (`spec.md` §9).
    #[must_use]
    pub const fn correlation_id(&self) -> Option<CorrelationId> { self.correlation_id }

    /// The reply-to topic, if one was supplied.
    #[must_use]
    pub fn reply_to(&self) -> Option<&str> { self.reply_to.as_deref() }

    /// The declared content type of the accompanying body.
    #[must_use]
    pub fn content_type(&self) -> &str { &self.content_type }
}

/// An opaque payload plus its declared body type.
#[derive(Debug, Clone)]
pub struct WireBody {
    payload: Vec<u8>,
    body_type: String,
}

impl WireBody {
    /// Build a body from raw bytes. `body_type` defaults to
    /// `"text/plain"` when empty.
    #[must_use]
    pub fn new(payload: Vec<u8>, body_type: impl Into<String>) -> Self {
        let body_type = body_type.into();
        Self { payload, body_type: if body_type.is_empty() { "text/plain".to_owned() } else { body_type } }
    }

    /// Build a body from a UTF-8 string.
    #[must_use]
    pub fn from_text(text: impl Into<String>, body_type: impl Into<String>) -> Self {
        Self::new(text.into().into_bytes(), body_type)
    }

    /// Build an empty body, used for the quit sentinel and for messages
    /// whose type makes their payload irrelevant.
    #[must_use]
    pub fn empty() -> Self { Self::new(Vec::new(), "text/plain") }

    /// The raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] { &self.payload }

    /// The declared body type.
    #[must_use]
    pub fn body_type(&self) -> &str { &self.body_type }

    /// Decode the payload as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::InvalidUtf8`] if the payload is not valid
    /// UTF-8.
    pub fn text(&self) -> Result<&str, MessagingError> {
        std::str::from_utf8(&self.payload).map_err(|_| MessagingError::InvalidUtf8)
    }
}

/// An immutable wire message: a header paired with a body.
#[derive(Debug, Clone)]
pub struct WireMessage {
    header: WireHeader,
    body: WireBody,
}

impl WireMessage {
    /// Pair a header with a body.
    #[must_use]
    pub const fn new(header: WireHeader, body: WireBody) -> Self { Self { header, body } }

    /// The message header.
    #[must_use]
    pub const fn header(&self) -> &WireHeader { &self.header }

    /// The message body.
    #[must_use]
    pub const fn body(&self) -> &WireBody { &self.body }

    /// The message identity, read from the header.
    #[must_use]
    pub const fn id(&self) -> MessageId { self.header.id }

    /// Build the quit sentinel a [`crate::channel::Channel`] enqueues to
    /// unwind its [`crate::pump::MessagePump`].
    #[must_use]
    pub fn quit() -> Self {
        Self::new(
            WireHeader::new(MessageId::new(), String::new(), MessageType::Quit, None, None, "text/plain"),
            WireBody::empty(),
        )
    }
}
