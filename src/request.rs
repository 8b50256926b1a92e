//! Request model: the in-process payloads the command processor dispatches.
//!
//! `spec.md` models requests nominally, keyed on a request's own notion of
//! "type". The Python original expresses that with a `key` class attribute
//! read at registration and lookup time. Rust already has a nominal type
//! token that serves the same purpose without a runtime check:
//! `std::any::TypeId`. [`HandlerRegistry`](crate::registry::HandlerRegistry)
//! and [`MapperRegistry`](crate::registry::MapperRegistry) key their maps on
//! `TypeId::of::<R>()`, so two distinct Rust types can never collide in the
//! registry and a request's "key" is simply its concrete type.

use std::fmt;

use uuid::Uuid;

/// 128-bit identity assigned to a request at construction and never
/// mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh, random request identity.
    #[must_use]
    pub fn new() -> Self { Self(Uuid::new_v4()) }

    /// Wrap an existing UUID as a request identity.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self { Self(id) }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid { self.0 }
}

impl Default for RequestId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<Uuid> for RequestId {
    fn from(id: Uuid) -> Self { Self(id) }
}

/// A payload the command processor can dispatch.
///
/// Implementors are plain data types; `Request` only asks for an identity
/// and enough trait bounds (`Send + Sync + 'static`) to live behind the
/// type-erased handler storage in [`crate::registry::HandlerRegistry`].
pub trait Request: Send + Sync + fmt::Debug + 'static {
    /// The identity assigned to this request instance.
    fn id(&self) -> RequestId;
}

/// Marker for requests dispatched to exactly one handler via
/// [`CommandProcessor::send`](crate::processor::CommandProcessor::send).
pub trait Command: Request {}

/// Marker for requests dispatched to an ordered list of handlers via
/// [`CommandProcessor::publish`](crate::processor::CommandProcessor::publish).
pub trait Event: Request {}
