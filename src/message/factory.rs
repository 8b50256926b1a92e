//! Parsing and encoding factories bridging wire messages and broker
//! transport headers.
//!
//! Grounded on `original_source/Brightside/arame/messaging.py`:
//! `ArameMessageFactory` parses inbound broker deliveries tolerantly
//! (Postel's law — missing or malformed fields degrade to safe defaults
//! rather than raising), while `KombuMessageFactory` encodes outbound
//! headers with only `MessageId` and `MessageType` mandatory.
//!
//! Two corrections from `spec.md` §9 are applied here rather than carried
//! over verbatim:
//!
//! - a missing `CorrelationId` header parses to `None`, never `""`;
//! - a quoted text payload has its surrounding quotes stripped only when
//!   the leading and trailing characters are the *same* quote character,
//!   not unconditionally.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::{CorrelationId, MessageId, MessageType, WireBody, WireHeader, WireMessage};
use crate::errors::MessagingError;

/// Canonical wire header keys, per `spec.md` §6.
pub mod header_keys {
    /// The message type header key.
    pub const MESSAGE_TYPE: &str = "MessageType";
    /// The message id header key.
    pub const MESSAGE_ID: &str = "MessageId";
    /// The correlation id header key.
    pub const CORRELATION_ID: &str = "CorrelationId";
    /// The topic header key.
    pub const TOPIC: &str = "Topic";
    /// The handled-count header key.
    pub const HANDLED_COUNT: &str = "HandledCount";
    /// The delay header key.
    pub const DELAY: &str = "x-delay";
    /// The original message id header key, set when a message is
    /// republished after a delay.
    pub const ORIGINAL_MESSAGE_ID: &str = "x-original-message-id";
    /// The broker delivery tag header key.
    pub const DELIVERY_TAG: &str = "DeliveryTag";
}

/// A broker delivery, prior to being parsed into a [`WireMessage`].
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    /// Transport-level headers, as received.
    pub headers: BTreeMap<String, String>,
    /// The raw payload bytes.
    pub payload: Vec<u8>,
    /// Whether the broker client reported a transport-level decode error
    /// for this delivery (distinct from a missing or malformed header).
    pub payload_unreadable: bool,
}

/// Tolerantly parses broker deliveries into [`WireMessage`]s.
///
/// Missing or malformed header fields never cause a parse failure: they
/// degrade to a safe default and, where that default changes the meaning
/// of the message, push its type to [`MessageType::Unacceptable`] so the
/// pump does not dispatch it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseFactory;

impl ParseFactory {
    /// Parse a raw broker delivery into a wire message.
    #[must_use]
    pub fn parse(&self, raw: &RawMessage) -> WireMessage {
        let id = raw
            .headers
            .get(header_keys::MESSAGE_ID)
            .and_then(|s| Uuid::parse_str(s).ok())
            .map_or_else(MessageId::new, MessageId::from);

        let topic = raw.headers.get(header_keys::TOPIC).cloned().unwrap_or_default();

        let correlation_id = raw
            .headers
            .get(header_keys::CORRELATION_ID)
            .filter(|s| !s.is_empty())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(CorrelationId::from);

        let reply_to = raw.headers.get(header_keys::DELIVERY_TAG).cloned();

        let declared_type = raw
            .headers
            .get(header_keys::MESSAGE_TYPE)
            .map_or(MessageType::Unacceptable, |s| MessageType::from_wire_str(s));

        let message_type = if raw.payload_unreadable { MessageType::Unacceptable } else { declared_type };

        let content_type =
            raw.headers.get("ContentType").cloned().unwrap_or_else(|| "text/plain".to_owned());

        let body = if raw.payload_unreadable {
            WireBody::empty()
        } else {
            decode_body(&raw.payload, &content_type)
        };

        WireMessage::new(
            WireHeader::new(id, topic, message_type, correlation_id, reply_to, content_type),
            body,
        )
    }
}

fn decode_body(payload: &[u8], content_type: &str) -> WireBody {
    let Ok(text) = std::str::from_utf8(payload) else {
        return WireBody::new(payload.to_vec(), content_type.to_owned());
    };
    let unescaped = unescape(text);
    let unquoted = strip_matching_quotes(&unescaped);
    WireBody::from_text(unquoted, content_type.to_owned())
}

/// Strip one layer of backslash escaping for the common textual escape
/// sequences a broker client may introduce when framing a payload as a
/// quoted string.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Strip a leading and trailing quote character only when both characters
/// are present and identical (`spec.md` §9), unlike the source's
/// unconditional `body_text[1:-1]`.
fn strip_matching_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return s[1..s.len() - 1].to_owned();
        }
    }
    s.to_owned()
}

/// Encodes outbound [`WireMessage`]s into broker transport headers.
///
/// `MessageId` and `MessageType` are always present; `CorrelationId` is
/// included only when the message carries one, per
/// `original_source/Brightside/arame/messaging.py`'s `KombuMessageFactory`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncodeFactory;

impl EncodeFactory {
    /// Encode a wire message's header into transport header key/value
    /// pairs.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::MissingHeaderField`] if the topic is
    /// empty; every message bound for the broker must carry a routing
    /// topic.
    pub fn encode_headers(&self, message: &WireMessage) -> Result<BTreeMap<String, String>, MessagingError> {
        let header = message.header();
        if header.topic().is_empty() {
            return Err(MessagingError::MissingHeaderField(header_keys::TOPIC));
        }

        let mut headers = BTreeMap::new();
        headers.insert(header_keys::MESSAGE_ID.to_owned(), header.id().to_string());
        headers.insert(header_keys::MESSAGE_TYPE.to_owned(), header.message_type().as_wire_str().to_owned());
        headers.insert(header_keys::TOPIC.to_owned(), header.topic().to_owned());
        if let Some(correlation_id) = header.correlation_id() {
            headers.insert(header_keys::CORRELATION_ID.to_owned(), correlation_id.to_string());
        }
        if let Some(reply_to) = header.reply_to() {
            headers.insert(header_keys::DELIVERY_TAG.to_owned(), reply_to.to_owned());
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn raw(headers: &[(&str, &str)], payload: &str) -> RawMessage {
        RawMessage {
            headers: headers.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect(),
            payload: payload.as_bytes().to_vec(),
            payload_unreadable: false,
        }
    }

    #[rstest]
    fn missing_correlation_id_parses_to_none() {
        let message = ParseFactory.parse(&raw(
            &[(header_keys::MESSAGE_TYPE, "command"), (header_keys::TOPIC, "orders.create")],
            "hello",
        ));
        assert!(message.header().correlation_id().is_none());
    }

    #[rstest]
    #[case("\"hello\"", "hello")]
    #[case("'hello'", "hello")]
    #[case("\"hello'", "\"hello'")]
    #[case("hello", "hello")]
    #[case("\"\"", "")]
    fn quote_stripping_requires_matching_pair(#[case] input: &str, #[case] expected: &str) {
        let message = ParseFactory.parse(&raw(&[(header_keys::MESSAGE_TYPE, "command")], input));
        assert_eq!(message.body().text().expect("utf8 body"), expected);
    }

    #[rstest]
    fn missing_message_type_is_unacceptable() {
        let message = ParseFactory.parse(&raw(&[], "payload"));
        assert_eq!(message.header().message_type(), MessageType::Unacceptable);
    }

    #[rstest]
    fn unreadable_payload_forces_unacceptable_regardless_of_declared_type() {
        let mut message = raw(&[(header_keys::MESSAGE_TYPE, "command")], "payload");
        message.payload_unreadable = true;
        let parsed = ParseFactory.parse(&message);
        assert_eq!(parsed.header().message_type(), MessageType::Unacceptable);
        assert!(parsed.body().as_bytes().is_empty());
    }

    #[rstest]
    fn encode_requires_a_topic() {
        let message = WireMessage::new(
            WireHeader::new(MessageId::new(), "", MessageType::Command, None, None, "text/plain"),
            WireBody::empty(),
        );
        let err = EncodeFactory.encode_headers(&message).expect_err("missing topic");
        assert!(matches!(err, MessagingError::MissingHeaderField(header_keys::TOPIC)));
    }

    #[rstest]
    #[case(MessageType::Command, "hello")]
    #[case(MessageType::Event, "")]
    fn wire_round_trip_preserves_id_type_and_payload(#[case] message_type: MessageType, #[case] payload: &str) {
        let original = WireMessage::new(
            WireHeader::new(MessageId::new(), "orders.create", message_type, None, None, "text/plain"),
            WireBody::from_text(payload, "text/plain"),
        );

        let headers = EncodeFactory.encode_headers(&original).expect("encodes");
        let raw = RawMessage { headers, payload: original.body().as_bytes().to_vec(), payload_unreadable: false };
        let round_tripped = ParseFactory.parse(&raw);

        assert_eq!(round_tripped.id(), original.id());
        assert_eq!(round_tripped.header().message_type(), original.header().message_type());
        assert_eq!(round_tripped.body().as_bytes(), original.body().as_bytes());
    }

    #[rstest]
    fn encode_includes_correlation_id_only_when_present() {
        let with_correlation = WireMessage::new(
            WireHeader::new(
                MessageId::new(),
                "orders.create",
                MessageType::Command,
                Some(CorrelationId::from_uuid(Uuid::new_v4())),
                None,
                "text/plain",
            ),
            WireBody::empty(),
        );
        let headers = EncodeFactory.encode_headers(&with_correlation).expect("encodes");
        assert!(headers.contains_key(header_keys::CORRELATION_ID));

        let without_correlation = WireMessage::new(
            WireHeader::new(MessageId::new(), "orders.create", MessageType::Command, None, None, "text/plain"),
            WireBody::empty(),
        );
        let headers = EncodeFactory.encode_headers(&without_correlation).expect("encodes");
        assert!(!headers.contains_key(header_keys::CORRELATION_ID));
    }
}
