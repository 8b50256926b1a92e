#![expect(clippy::expect_used, reason = "test assertions")]
#![expect(clippy::unwrap_used, reason = "test assertions")]

//! End-to-end coverage of the command processor's dispatch and broker-relay
//! scenarios (S1-S6, and the outbox-before-send ordering invariant).

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use brightside::{
    broker::{Consumer, Producer},
    errors::CircuitBrokenError,
    handler::Handler,
    message::{MessageType, WireBody, WireHeader, WireMessage},
    pipeline::{CircuitBreaker, DecoratedError, Retry},
    processor::CommandProcessor,
    registry::{HandlerRegistry, MapperRegistry},
    request::{Command, Event, Request, RequestId},
};
use rstest::rstest;
use test_util::{FakeMessageStore, FakeProducer};
use thiserror::Error;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Ping {
    id: RequestId,
}

impl Request for Ping {
    fn id(&self) -> RequestId { self.id }
}

impl Command for Ping {}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Announcement {
    id: RequestId,
}

impl Request for Announcement {
    fn id(&self) -> RequestId { self.id }
}

impl Event for Announcement {}

struct CountingHandler {
    calls: Arc<AtomicU32>,
}

impl Handler<Ping> for CountingHandler {
    type Error = std::convert::Infallible;

    fn handle(&self, _request: &Ping) -> Result<(), Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct OrderRecordingHandler {
    name: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
}

impl Handler<Announcement> for OrderRecordingHandler {
    type Error = std::convert::Infallible;

    fn handle(&self, _request: &Announcement) -> Result<(), Self::Error> {
        self.order.lock().expect("lock poisoned").push(self.name);
        Ok(())
    }
}

#[rstest]
fn s1_send_dispatches_to_the_single_registered_handler_exactly_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry
        .register_command::<Ping, _>({
            let calls = Arc::clone(&calls);
            move || CountingHandler { calls: Arc::clone(&calls) }
        })
        .expect("register handler");

    let processor = CommandProcessor::new(registry);
    processor.send(Ping { id: RequestId::new() }).expect("send succeeds");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
fn invariant_3_send_with_no_registered_handler_is_a_configuration_error() {
    let processor = CommandProcessor::new(HandlerRegistry::new());
    let err = processor.send(Ping { id: RequestId::new() }).expect_err("no handler registered");
    assert!(matches!(
        err,
        brightside::errors::BrightsideError::Configuration(
            brightside::errors::ConfigurationError::MissingCommandHandler
        )
    ));
}

#[rstest]
fn s2_publish_dispatches_to_every_handler_in_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    registry.register_event::<Announcement, _>({
        let order = Arc::clone(&order);
        move || OrderRecordingHandler { name: "first", order: Arc::clone(&order) }
    });
    registry.register_event::<Announcement, _>({
        let order = Arc::clone(&order);
        move || OrderRecordingHandler { name: "second", order: Arc::clone(&order) }
    });

    let processor = CommandProcessor::new(registry);
    processor.publish(Announcement { id: RequestId::new() }).expect("publish succeeds");

    assert_eq!(*order.lock().expect("lock poisoned"), vec!["first", "second"]);
}

#[rstest]
fn invariant_4_publish_with_no_registered_handlers_does_not_raise() {
    let processor = CommandProcessor::new(HandlerRegistry::new());
    processor.publish(Announcement { id: RequestId::new() }).expect("publish is a no-op, not an error");
}

fn ping_mapper(request: &Ping) -> WireMessage {
    WireMessage::new(
        WireHeader::new(
            brightside::message::MessageId::new(),
            "pings",
            MessageType::Command,
            None,
            None,
            "application/json",
        ),
        WireBody::from_text(serde_json::to_string(request).expect("serialises"), "application/json"),
    )
}

#[rstest]
#[tokio::test]
async fn s3_post_persists_to_the_outbox_and_sends_exactly_once() {
    let mut mapper_registry = MapperRegistry::new();
    mapper_registry.register::<Ping>(ping_mapper).expect("register mapper");

    let message_store = Arc::new(FakeMessageStore::new());
    let producer = Arc::new(FakeProducer::new());
    let processor = CommandProcessor::new(HandlerRegistry::new()).with_broker(
        mapper_registry,
        message_store.clone() as Arc<dyn brightside::store::MessageStore>,
        producer.clone() as Arc<dyn Producer>,
    );

    let request = Ping { id: RequestId::new() };
    processor.post(request.clone()).await.expect("post succeeds");

    assert_eq!(message_store.len().await, 1);
    assert_eq!(producer.sent().len(), 1);
}

#[rstest]
#[tokio::test]
async fn invariant_10_producer_failure_during_post_leaves_the_message_in_the_outbox() {
    let mut mapper_registry = MapperRegistry::new();
    mapper_registry.register::<Ping>(ping_mapper).expect("register mapper");

    let message_store = Arc::new(FakeMessageStore::new());
    let producer = Arc::new(FakeProducer::new());
    producer.fail_next_send();
    let processor = CommandProcessor::new(HandlerRegistry::new()).with_broker(
        mapper_registry,
        message_store.clone() as Arc<dyn brightside::store::MessageStore>,
        producer as Arc<dyn Producer>,
    );

    let request = Ping { id: RequestId::new() };
    let err = processor.post(request).await.expect_err("producer send fails");
    assert!(matches!(err, brightside::errors::BrightsideError::ChannelFailure(_)));

    assert_eq!(message_store.len().await, 1, "the outbox write happened before the failing send");
}

#[derive(Debug, Error, Clone)]
#[error("not yet")]
struct NotYet;

struct FlakyHandler {
    calls: Arc<AtomicU32>,
    succeeds_on_attempt: u32,
}

impl Handler<Ping> for FlakyHandler {
    type Error = NotYet;

    fn handle(&self, _request: &Ping) -> Result<(), Self::Error> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= self.succeeds_on_attempt { Ok(()) } else { Err(NotYet) }
    }
}

#[rstest]
fn s4_retry_succeeds_after_two_failures_with_call_count_three() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry
        .register_command::<Ping, _>({
            let calls = Arc::clone(&calls);
            move || {
                Retry::<Ping, _>::new(
                    FlakyHandler { calls: Arc::clone(&calls), succeeds_on_attempt: 3 },
                    3,
                    Duration::ZERO,
                    |_| true,
                )
            }
        })
        .expect("register handler");

    let processor = CommandProcessor::new(registry);
    processor.send(Ping { id: RequestId::new() }).expect("send eventually succeeds");

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

struct AlwaysFailsHandler {
    calls: Arc<AtomicU32>,
}

impl Handler<Ping> for AlwaysFailsHandler {
    type Error = NotYet;

    fn handle(&self, _request: &Ping) -> Result<(), Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NotYet)
    }
}

#[rstest]
fn s5_retry_exhaustion_reraises_the_original_error_after_exactly_n_calls() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = HandlerRegistry::new();
    registry
        .register_command::<Ping, _>({
            let calls = Arc::clone(&calls);
            move || Retry::<Ping, _>::new(AlwaysFailsHandler { calls: Arc::clone(&calls) }, 3, Duration::ZERO, |_| true)
        })
        .expect("register handler");

    let processor = CommandProcessor::new(registry);
    let err = processor.send(Ping { id: RequestId::new() }).expect_err("every attempt fails");

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(matches!(
        err,
        brightside::errors::BrightsideError::Handler(source) if source.downcast_ref::<NotYet>().is_some()
    ));
}

#[rstest]
fn s6_retry_around_circuit_breaker_trips_then_propagates_circuit_broken_without_calling_the_handler() {
    let calls = Arc::new(AtomicU32::new(0));
    let breaker = Arc::new(CircuitBreaker::new(AlwaysFailsHandler { calls: Arc::clone(&calls) }, 3, Duration::from_secs(60)));

    // First `send`: retry(3) drives the breaker through all three failures,
    // the handler is called three times, and the underlying error surfaces
    // (not CircuitBrokenError) since the breaker only opens on the third
    // failure, after which retry has already exhausted its budget.
    let first_attempt = Retry::<Ping, _>::new(Arc::clone(&breaker), 3, Duration::ZERO, |e| {
        matches!(e, DecoratedError::Inner(_))
    });
    let err = first_attempt.handle(&Ping { id: RequestId::new() }).expect_err("handler always fails");
    assert!(matches!(err, DecoratedError::Inner(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 3, "breaker trips on the third call, within this first send");

    // Second `send`: the breaker is now open, so every retry attempt is
    // rejected with CircuitBrokenError without invoking the handler again.
    let second_attempt = Retry::<Ping, _>::new(Arc::clone(&breaker), 3, Duration::ZERO, |e| {
        matches!(e, DecoratedError::Inner(_))
    });
    let err = second_attempt.handle(&Ping { id: RequestId::new() }).expect_err("breaker is open");
    assert!(matches!(err, DecoratedError::CircuitBroken(CircuitBrokenError)));
    assert_eq!(calls.load(Ordering::SeqCst), 3, "the handler is not called while the breaker is open");
}

impl<R, H> Handler<R> for Arc<CircuitBreaker<H>>
where
    R: Request,
    H: Handler<R>,
{
    type Error = DecoratedError<H::Error>;

    fn handle(&self, request: &R) -> Result<(), Self::Error> { self.as_ref().handle(request) }
}
