//! Handler pipeline decorators: logging, retry, and circuit-breaking,
//! composed by wrapping one `Handler` in another rather than by a
//! language-level decorator, per `spec.md` §4.9 / Design Notes.
//!
//! The source's logging decorator (`original_source/Brightside/core/log_handler.py`)
//! raises `ConfigurationException` if its first positional argument is not
//! a `Request`; the `R: Request` bound on [`Handler`] makes that check
//! redundant here; it cannot fail to hold.
//!
//! Composition mirrors `spec.md`'s example:
//! `with_retry(with_circuit_breaker(with_logging(handler)))` — retry sits
//! outermost so it can retry a transient handler failure, but stops
//! retrying the instant the breaker opens.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{Span, debug, span};

use crate::{errors::CircuitBrokenError, handler::Handler, request::Request};

/// Wraps a handler's error with the possibility of a circuit-breaker
/// trip, so decorators that sit outside a [`CircuitBreaker`] can
/// distinguish "the handler failed" from "the breaker is open".
#[derive(Debug, Clone, Error)]
pub enum DecoratedError<E> {
    /// The wrapped handler itself failed.
    #[error(transparent)]
    Inner(#[from] E),
    /// The circuit breaker rejected the call without invoking the
    /// handler.
    #[error(transparent)]
    CircuitBroken(#[from] CircuitBrokenError),
}

/// Logs entry and exit of the wrapped handler via `tracing`, in place of
/// the source's raw `logging.getLogger` calls.
pub struct Logging<H> {
    inner: H,
    name: &'static str,
}

impl<H> Logging<H> {
    /// Wrap `inner`, logging under `name`.
    #[must_use]
    pub const fn new(inner: H, name: &'static str) -> Self { Self { inner, name } }
}

impl<R, H> Handler<R> for Logging<H>
where
    R: Request,
    H: Handler<R>,
{
    type Error = H::Error;

    fn handle(&self, request: &R) -> Result<(), Self::Error> {
        let entry: Span = span!(tracing::Level::DEBUG, "handler", name = self.name, request_id = %request.id());
        let _guard = entry.enter();
        debug!("entering handler");
        let result = self.inner.handle(request);
        match &result {
            Ok(()) => debug!("handler completed"),
            Err(e) => debug!(error = %e, "handler failed"),
        }
        result
    }
}

/// Retries the wrapped handler up to `times` times at a fixed `interval`,
/// when `should_retry` reports the failure as worth retrying.
///
/// Retry is synchronous: it blocks the calling thread between attempts,
/// matching the command processor's synchronous dispatch model
/// (`spec.md` §5). `R` is carried as part of the type so `H::Error` is
/// unambiguous: each concrete handler implements `Handler<R>` for one
/// specific request type.
pub struct Retry<R, H: Handler<R>> {
    inner: H,
    times: u32,
    interval: Duration,
    should_retry: fn(&H::Error) -> bool,
    _request: std::marker::PhantomData<fn(&R)>,
}

impl<R, H: Handler<R>> Retry<R, H> {
    /// Wrap `inner`, retrying up to `times` times at `interval`, retrying
    /// only errors for which `should_retry` returns `true`.
    ///
    /// `R` usually needs a turbofish at the call site (`Retry::<MyCommand, _>::new(...)`):
    /// nothing about the arguments pins down which request type `inner`
    /// handles when a handler type could in principle implement `Handler`
    /// for more than one request.
    #[must_use]
    pub const fn new(inner: H, times: u32, interval: Duration, should_retry: fn(&H::Error) -> bool) -> Self {
        Self { inner, times, interval, should_retry, _request: std::marker::PhantomData }
    }
}

impl<R, H> Handler<R> for Retry<R, H>
where
    R: Request,
    H: Handler<R>,
    H::Error: Clone,
{
    type Error = H::Error;

    fn handle(&self, request: &R) -> Result<(), Self::Error> {
        let mut last_error = None;
        for attempt in 0..self.times.max(1) {
            match self.inner.handle(request) {
                Ok(()) => return Ok(()),
                Err(e) if (self.should_retry)(&e) && attempt + 1 < self.times => {
                    debug!(attempt, request_id = %request.id(), "retrying handler");
                    std::thread::sleep(self.interval);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        #[expect(clippy::unwrap_used, reason = "loop runs at least once, so an error is always recorded before exit")]
        Err(last_error.unwrap())
    }
}

/// The circuit breaker's internal state machine.
#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

/// Trips open after `threshold` consecutive handler failures, rejecting
/// further calls with [`CircuitBrokenError`] until `reset_timeout`
/// elapses, then allows one probe call through (half-open) before
/// deciding whether to close again or re-open.
pub struct CircuitBreaker<H> {
    inner: H,
    threshold: u32,
    reset_timeout: Duration,
    consecutive_failures: AtomicU32,
    state: Mutex<BreakerState>,
}

impl<H> CircuitBreaker<H> {
    /// Wrap `inner`, tripping after `threshold` consecutive failures and
    /// resetting after `reset_timeout`.
    #[must_use]
    pub fn new(inner: H, threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner,
            threshold,
            reset_timeout,
            consecutive_failures: AtomicU32::new(0),
            state: Mutex::new(BreakerState::Closed),
        }
    }
}

impl<R, H> Handler<R> for CircuitBreaker<H>
where
    R: Request,
    H: Handler<R>,
{
    type Error = DecoratedError<H::Error>;

    #[expect(clippy::unwrap_used, reason = "breaker mutex is never poisoned: its critical sections never panic")]
    fn handle(&self, request: &R) -> Result<(), Self::Error> {
        let should_probe = {
            let mut state = self.state.lock().unwrap();
            match *state {
                BreakerState::Closed => true,
                BreakerState::HalfOpen => true,
                BreakerState::Open { opened_at } if opened_at.elapsed() >= self.reset_timeout => {
                    *state = BreakerState::HalfOpen;
                    true
                }
                BreakerState::Open { .. } => false,
            }
        };

        if !should_probe {
            return Err(CircuitBrokenError.into());
        }

        match self.inner.handle(request) {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                *self.state.lock().unwrap() = BreakerState::Closed;
                Ok(())
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.threshold {
                    *self.state.lock().unwrap() = BreakerState::Open { opened_at: Instant::now() };
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use rstest::rstest;
    use thiserror::Error;

    use super::*;
    use crate::request::RequestId;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct Ping;

    impl Request for Ping {
        fn id(&self) -> RequestId { RequestId::new() }
    }

    #[derive(Debug, Error, Clone)]
    #[error("handler failed")]
    struct HandlerFailed;

    struct AlwaysFails {
        calls: AtomicU32,
    }

    impl Handler<Ping> for AlwaysFails {
        type Error = HandlerFailed;

        fn handle(&self, _request: &Ping) -> Result<(), Self::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(HandlerFailed)
        }
    }

    #[rstest]
    fn retry_exhausts_attempts_before_failing() {
        let handler =
            Retry::<Ping, _>::new(AlwaysFails { calls: AtomicU32::new(0) }, 3, Duration::ZERO, |_| true);
        let err = handler.handle(&Ping);
        assert!(err.is_err());
        assert_eq!(handler.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[rstest]
    fn circuit_breaker_opens_after_threshold_then_propagates_without_calling_handler() {
        let breaker = CircuitBreaker::new(AlwaysFails { calls: AtomicU32::new(0) }, 2, Duration::from_secs(60));

        assert!(matches!(breaker.handle(&Ping), Err(DecoratedError::Inner(_))));
        assert!(matches!(breaker.handle(&Ping), Err(DecoratedError::Inner(_))));
        assert_eq!(breaker.inner.calls.load(Ordering::SeqCst), 2);

        let err = breaker.handle(&Ping);
        assert!(matches!(err, Err(DecoratedError::CircuitBroken(_))));
        assert_eq!(breaker.inner.calls.load(Ordering::SeqCst), 2, "breaker must not call the handler while open");
    }
}
