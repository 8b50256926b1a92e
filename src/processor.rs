//! The command processor: synchronous, reentrant dispatch for commands and
//! events, plus relaying requests onto the broker.
//!
//! Grounded on `original_source/Brightside/core/command_processor.py`'s
//! `CommandProcessor.send`/`publish`/`post`.

use std::sync::Arc;

use serde::Serialize;

use crate::{
    broker::Producer,
    errors::{BrightsideError, ConfigurationError},
    registry::{HandlerRegistry, MapperRegistry},
    request::{Command, Event, Request},
    store::MessageStore,
};

/// Dispatches commands and events to registered handlers, and optionally
/// relays requests onto a broker via a mapper registry, outbox, and
/// producer.
pub struct CommandProcessor {
    registry: HandlerRegistry,
    mapper_registry: Option<MapperRegistry>,
    message_store: Option<Arc<dyn MessageStore>>,
    producer: Option<Arc<dyn Producer>>,
}

impl CommandProcessor {
    /// Build a processor with only in-process dispatch configured. `post`
    /// is unavailable until [`Self::with_broker`] is called.
    #[must_use]
    pub const fn new(registry: HandlerRegistry) -> Self {
        Self { registry, mapper_registry: None, message_store: None, producer: None }
    }

    /// Configure this processor for `post`, wiring in the mapper
    /// registry, outbox, and producer it relays through.
    #[must_use]
    pub fn with_broker(
        mut self,
        mapper_registry: MapperRegistry,
        message_store: Arc<dyn MessageStore>,
        producer: Arc<dyn Producer>,
    ) -> Self {
        self.mapper_registry = Some(mapper_registry);
        self.message_store = Some(message_store);
        self.producer = Some(producer);
        self
    }

    /// Dispatch a command to its sole registered handler.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingCommandHandler`] if no handler
    /// is registered for `C`, or the handler's own error if it fails.
    pub fn send<C>(&self, request: C) -> Result<(), BrightsideError>
    where
        C: Command + 'static,
    {
        let factory = self.registry.lookup_command::<C>()?;
        let handler = factory();
        handler.handle_dyn(&request).map_err(BrightsideError::Handler)
    }

    /// Dispatch an event to every registered handler, in registration
    /// order, stopping at the first handler that fails.
    ///
    /// Publishing an event with no registered handlers is not an error.
    ///
    /// # Errors
    ///
    /// Returns the first failing handler's error, if any.
    pub fn publish<E>(&self, request: E) -> Result<(), BrightsideError>
    where
        E: Event + 'static,
    {
        for factory in self.registry.lookup_event::<E>() {
            let handler = factory();
            handler.handle_dyn(&request).map_err(BrightsideError::Handler)?;
        }
        Ok(())
    }

    /// Relay a request to the broker: map it to a wire message, persist it
    /// to the outbox, then hand it to the producer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingMapperRegistry`],
    /// [`ConfigurationError::MissingMessageStore`], or
    /// [`ConfigurationError::MissingProducer`] if this processor was not
    /// built with [`Self::with_broker`]; [`ConfigurationError::MissingMapper`]
    /// if no mapper is registered for `R`; or a broker failure from the
    /// outbox write or the producer send.
    pub async fn post<R>(&self, request: R) -> Result<(), BrightsideError>
    where
        R: Request + Serialize + 'static,
    {
        let mapper_registry =
            self.mapper_registry.as_ref().ok_or(ConfigurationError::MissingMapperRegistry)?;
        let message_store = self.message_store.as_ref().ok_or(ConfigurationError::MissingMessageStore)?;
        let producer = self.producer.as_ref().ok_or(ConfigurationError::MissingProducer)?;

        let mapper = mapper_registry.lookup::<R>()?;
        let message = mapper(&request);

        message_store.add(message.clone()).await?;
        producer.send(&message).await?;
        Ok(())
    }
}
