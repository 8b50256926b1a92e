//! Registries mapping a request's nominal type to handler factories or
//! message mappers.
//!
//! Both registries are type maps keyed on `TypeId::of::<R>()`: Rust's
//! static type system already gives every request a unique nominal key, so
//! there is no runtime equivalent of the Python source's `key` class
//! attribute to maintain.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use crate::{
    errors::ConfigurationError,
    handler::{DynHandler, ErasedHandler, Handler},
    message::WireMessage,
    request::{Command, Event, Request},
};

/// A factory that produces a fresh, type-erased handler instance on demand,
/// mirroring the source's per-dispatch handler instantiation.
pub type HandlerFactory<R> = Arc<dyn Fn() -> Box<dyn DynHandler<R>> + Send + Sync>;

struct CommandEntry<C: Request>(HandlerFactory<C>);
struct EventEntry<E: Request>(Vec<HandlerFactory<E>>);

/// Maps each command type to exactly one handler factory and each event
/// type to an ordered list of handler factories.
#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    events: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register the sole handler factory for command type `C`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateCommandHandler`] if a handler
    /// is already registered for `C`.
    pub fn register_command<C, H>(
        &mut self,
        factory: impl Fn() -> H + Send + Sync + 'static,
    ) -> Result<(), ConfigurationError>
    where
        C: Command + 'static,
        H: Handler<C> + 'static,
    {
        let key = TypeId::of::<C>();
        if self.commands.contains_key(&key) {
            return Err(ConfigurationError::DuplicateCommandHandler);
        }
        let boxed: HandlerFactory<C> =
            Arc::new(move || Box::new(ErasedHandler(factory())) as Box<dyn DynHandler<C>>);
        self.commands.insert(key, Box::new(CommandEntry(boxed)));
        Ok(())
    }

    /// Append a handler factory to the ordered list for event type `E`.
    pub fn register_event<E, H>(&mut self, factory: impl Fn() -> H + Send + Sync + 'static)
    where
        E: Event + 'static,
        H: Handler<E> + 'static,
    {
        let key = TypeId::of::<E>();
        let boxed: HandlerFactory<E> =
            Arc::new(move || Box::new(ErasedHandler(factory())) as Box<dyn DynHandler<E>>);
        let slot = self
            .events
            .entry(key)
            .or_insert_with(|| Box::new(EventEntry::<E>(Vec::new())));
        match slot.downcast_mut::<EventEntry<E>>() {
            Some(entry) => entry.0.push(boxed),
            None => {
                // The TypeId-keyed slot can only ever hold an EventEntry<E>
                // for this key, so this arm is unreachable in practice; it
                // is kept as a silent no-op rather than a panic.
            }
        }
    }

    /// Look up the sole handler factory registered for command type `C`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingCommandHandler`] if no handler
    /// is registered for `C`.
    pub fn lookup_command<C>(&self) -> Result<HandlerFactory<C>, ConfigurationError>
    where
        C: Command + 'static,
    {
        self.commands
            .get(&TypeId::of::<C>())
            .and_then(|entry| entry.downcast_ref::<CommandEntry<C>>())
            .map(|entry| Arc::clone(&entry.0))
            .ok_or(ConfigurationError::MissingCommandHandler)
    }

    /// Look up the ordered handler factories registered for event type `E`.
    ///
    /// Returns an empty list if no handler has been registered; publishing
    /// an event with no subscribers is not an error.
    #[must_use]
    pub fn lookup_event<E>(&self) -> Vec<HandlerFactory<E>>
    where
        E: Event + 'static,
    {
        self.events
            .get(&TypeId::of::<E>())
            .and_then(|entry| entry.downcast_ref::<EventEntry<E>>())
            .map(|entry| entry.0.clone())
            .unwrap_or_default()
    }
}

/// A mapper that turns a request into its wire representation.
pub type MapperFn<R> = Arc<dyn Fn(&R) -> WireMessage + Send + Sync>;

/// Maps each request type eligible for `post` to a single message mapper.
#[derive(Default)]
pub struct MapperRegistry {
    mappers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MapperRegistry {
    /// Create an empty mapper registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register the mapper for request type `R`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateMapper`] if a mapper is
    /// already registered for `R`.
    pub fn register<R>(
        &mut self,
        mapper: impl Fn(&R) -> WireMessage + Send + Sync + 'static,
    ) -> Result<(), ConfigurationError>
    where
        R: Request + 'static,
    {
        let key = TypeId::of::<R>();
        if self.mappers.contains_key(&key) {
            return Err(ConfigurationError::DuplicateMapper);
        }
        let boxed: MapperFn<R> = Arc::new(mapper);
        self.mappers.insert(key, Box::new(boxed));
        Ok(())
    }

    /// Look up the mapper registered for request type `R`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingMapper`] if no mapper is
    /// registered for `R`.
    pub fn lookup<R>(&self) -> Result<MapperFn<R>, ConfigurationError>
    where
        R: Request + 'static,
    {
        self.mappers
            .get(&TypeId::of::<R>())
            .and_then(|entry| entry.downcast_ref::<MapperFn<R>>())
            .map(Arc::clone)
            .ok_or(ConfigurationError::MissingMapper)
    }
}
