//! The message pump: drains a [`Channel`] through a [`CommandProcessor`]
//! until it sees the quit sentinel.
//!
//! Grounded on `mxd::wireframe::connection_handler::handle_connection`'s
//! `loop { match ... }` shape, with `tracing` at each step instead of raw
//! `eprintln!`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::{
    channel::Channel,
    errors::BrightsideError,
    message::{MessageType, WireMessage},
    processor::CommandProcessor,
    request::{Command, Event},
};

/// The outcome of dispatching one delivered message, used internally to
/// decide whether to acknowledge it.
enum DispatchOutcome {
    Dispatched,
    Undeliverable,
    PoisonPill(BrightsideError),
    HandlerFailed(BrightsideError),
}

/// A route from a topic to the concrete request type that topic's
/// payloads deserialise into, and the `send`/`publish` call that
/// dispatches it.
pub type Route = Arc<dyn Fn(&CommandProcessor, &WireMessage) -> Result<(), BrightsideError> + Send + Sync>;

/// Build a route for a command type `C`: deserialise the message body as
/// JSON into `C` and dispatch it via
/// [`CommandProcessor::send`](crate::processor::CommandProcessor::send).
#[must_use]
pub fn command_route<C>() -> Route
where
    C: Command + DeserializeOwned,
{
    Arc::new(|processor, message| {
        let request: C = serde_json::from_slice(message.body().as_bytes())
            .map_err(crate::errors::MessagingError::Deserialize)?;
        processor.send(request)
    })
}

/// Build a route for an event type `E`: deserialise the message body as
/// JSON into `E` and dispatch it via
/// [`CommandProcessor::publish`](crate::processor::CommandProcessor::publish).
#[must_use]
pub fn event_route<E>() -> Route
where
    E: Event + DeserializeOwned,
{
    Arc::new(|processor, message| {
        let request: E = serde_json::from_slice(message.body().as_bytes())
            .map_err(crate::errors::MessagingError::Deserialize)?;
        processor.publish(request)
    })
}

/// Drains a [`Channel`], deserialising each delivered message per its
/// topic's registered [`Route`] and dispatching it through a
/// [`CommandProcessor`].
pub struct MessagePump {
    channel: Arc<Channel>,
    processor: Arc<CommandProcessor>,
    routes: HashMap<String, Route>,
    receive_timeout: Duration,
}

impl MessagePump {
    /// Build a pump over `channel`, dispatching through `processor`.
    #[must_use]
    pub fn new(channel: Arc<Channel>, processor: Arc<CommandProcessor>, receive_timeout: Duration) -> Self {
        Self { channel, processor, routes: HashMap::new(), receive_timeout }
    }

    /// Register the route for messages on `topic`.
    pub fn route(&mut self, topic: impl Into<String>, route: Route) { self.routes.insert(topic.into(), route); }

    /// Run the pump loop until the channel yields the quit sentinel or a
    /// broker failure exhausts its retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ChannelFailureError`] if the channel's
    /// retry budget is exhausted while receiving.
    pub async fn run(&self) -> Result<(), crate::errors::ChannelFailureError> {
        loop {
            let Some(message) = self.channel.receive(self.receive_timeout).await? else {
                continue;
            };

            match message.header().message_type() {
                MessageType::Quit => {
                    info!(channel = self.channel.name(), "received quit sentinel, stopping pump");
                    return Ok(());
                }
                MessageType::Unacceptable | MessageType::None => {
                    debug!(
                        channel = self.channel.name(),
                        topic = message.header().topic(),
                        "acknowledging non-dispatchable message"
                    );
                    self.channel.acknowledge(&message);
                }
                MessageType::Command | MessageType::Event => self.dispatch(&message),
            }
        }
    }

    fn dispatch(&self, message: &WireMessage) {
        match self.dispatch_inner(message) {
            DispatchOutcome::Dispatched => self.channel.acknowledge(message),
            DispatchOutcome::Undeliverable => {
                warn!(
                    topic = message.header().topic(),
                    message_id = %message.id(),
                    "no route registered for topic, acknowledging without dispatch"
                );
                self.channel.acknowledge(message);
            }
            DispatchOutcome::PoisonPill(err) => {
                warn!(
                    topic = message.header().topic(),
                    message_id = %message.id(),
                    error = %err,
                    "unrecoverable deserialisation error, acknowledging to drop poison message"
                );
                self.channel.acknowledge(message);
            }
            DispatchOutcome::HandlerFailed(err) => {
                error!(
                    topic = message.header().topic(),
                    message_id = %message.id(),
                    error = %err,
                    "handler dispatch failed, leaving message unacknowledged"
                );
            }
        }
    }

    fn dispatch_inner(&self, message: &WireMessage) -> DispatchOutcome {
        let Some(route) = self.routes.get(message.header().topic()) else {
            return DispatchOutcome::Undeliverable;
        };
        match route(&self.processor, message) {
            Ok(()) => DispatchOutcome::Dispatched,
            Err(err @ BrightsideError::Messaging(_)) => DispatchOutcome::PoisonPill(err),
            Err(err) => DispatchOutcome::HandlerFailed(err),
        }
    }
}
