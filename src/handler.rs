//! The handler contract requests are dispatched to.
//!
//! `spec.md` describes a `Handler` as a stateful or stateless object
//! exposing a single `handle(request)` operation. The source's logging
//! decorator additionally requires the first positional argument to be a
//! `Request`, raising `ConfigurationException` otherwise; under Rust's
//! static typing that check is enforced at compile time by the `R: Request`
//! bound below and needs no runtime counterpart.

use std::error::Error as StdError;

use crate::request::Request;

/// A handler for a specific request type `R`.
///
/// Handlers are invoked synchronously on the calling thread: the command
/// processor never awaits a handler, matching the synchronous, reentrant
/// dispatch model in `spec.md` §5.
pub trait Handler<R: Request>: Send + Sync {
    /// The error type this handler's application logic can fail with.
    type Error: StdError + Send + Sync + 'static;

    /// Handle one request instance.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the handler's application logic fails.
    fn handle(&self, request: &R) -> Result<(), Self::Error>;
}

/// Type-erased form of [`Handler`], used internally so that
/// [`crate::registry::HandlerRegistry`] can store handlers for many
/// concrete `R` types behind a single map value without becoming generic
/// over every error type those handlers raise.
pub trait DynHandler<R: Request>: Send + Sync {
    /// Handle one request instance, boxing any application error.
    ///
    /// # Errors
    ///
    /// Returns the handler's error, boxed as a trait object.
    fn handle_dyn(&self, request: &R) -> Result<(), Box<dyn StdError + Send + Sync + 'static>>;
}

pub(crate) struct ErasedHandler<H>(pub H);

impl<R, H> DynHandler<R> for ErasedHandler<H>
where
    R: Request,
    H: Handler<R>,
{
    fn handle_dyn(&self, request: &R) -> Result<(), Box<dyn StdError + Send + Sync + 'static>> {
        self.0.handle(request).map_err(|e| Box::new(e) as _)
    }
}
