use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::aggregate::{AggregateRoot, RegistrationError};
use crate::artifacts::EventType;
use crate::event::Event;
use crate::event_types::EventTypes;

type OnApplied<A> = Box<dyn Fn(&mut A, &dyn Any) + Send + Sync>;
type OnReplayed<A> = Box<dyn Fn(&mut A, &Value) -> Result<(), serde_json::Error> + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    /// The event store returned an event this aggregate root does not handle.
    #[error("no handler is registered for event type {event_type}")]
    Missing { event_type: EventType },
    #[error("could not deserialize event of type {event_type} into {type_name}")]
    Deserialize {
        event_type: EventType,
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

struct Handler<A> {
    type_name: &'static str,
    on_applied: OnApplied<A>,
    on_replayed: OnReplayed<A>,
}

struct PendingHandler<A> {
    type_id: TypeId,
    handler: Handler<A>,
}

/// Collects the handlers of an aggregate root while it is being registered.
pub struct EventHandlersBuilder<A> {
    pending: Vec<PendingHandler<A>>,
}

impl<A: AggregateRoot> EventHandlersBuilder<A> {
    pub(crate) fn new() -> Self {
        Self { pending: vec![] }
    }

    /// Handle events of type `E` with `handler`, both when replaying history and when applying.
    pub fn on<E: Event>(mut self, handler: fn(&mut A, &E)) -> Self {
        let on_applied: OnApplied<A> = Box::new(move |root, event| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(root, event);
            }
        });
        let on_replayed: OnReplayed<A> = Box::new(move |root, content| {
            let event = E::deserialize(content)?;
            handler(root, &event);
            Ok(())
        });

        self.pending.push(PendingHandler {
            type_id: TypeId::of::<E>(),
            handler: Handler {
                type_name: std::any::type_name::<E>(),
                on_applied,
                on_replayed,
            },
        });
        self
    }

    /// Resolves every handled type to its event type.
    pub(crate) fn build(self, event_types: &EventTypes) -> Result<EventHandlers<A>, RegistrationError> {
        let aggregate_root = std::any::type_name::<A>();
        let mut handlers = EventHandlers {
            handlers: HashMap::with_capacity(self.pending.len()),
            by_type_id: HashMap::with_capacity(self.pending.len()),
        };

        for PendingHandler { type_id, handler } in self.pending {
            let event_type = event_types
                .get_for_type_id(type_id)
                .cloned()
                .ok_or(RegistrationError::UnknownEventType {
                    aggregate_root,
                    type_name: handler.type_name,
                })?;

            if handlers.handlers.contains_key(&event_type) {
                return Err(RegistrationError::DuplicateHandler {
                    aggregate_root,
                    event_type,
                });
            }

            handlers.by_type_id.insert(type_id, event_type.clone());
            handlers.handlers.insert(event_type, handler);
        }

        Ok(handlers)
    }
}

/// The table mapping event types to the functions updating an aggregate root's state.
///
/// Built once per aggregate root type while registering it and never changed afterwards.
pub struct EventHandlers<A> {
    handlers: HashMap<EventType, Handler<A>>,
    by_type_id: HashMap<TypeId, EventType>,
}

impl<A> EventHandlers<A> {
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn handles(&self, event_type: &EventType) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// The event types with a handler, which is what history gets filtered by.
    pub fn event_types(&self) -> impl Iterator<Item = &EventType> {
        self.handlers.keys()
    }

    /// Handles a freshly applied event. Events without a handler leave the state untouched.
    pub(crate) fn on_applied<E: Event>(&self, root: &mut A, event: &E) {
        if let Some(handler) = self
            .by_type_id
            .get(&TypeId::of::<E>())
            .and_then(|event_type| self.handlers.get(event_type))
        {
            (handler.on_applied)(root, event);
        }
    }

    /// Handles an event from history. Unlike [`Self::on_applied`] a missing handler is an error.
    pub(crate) fn on_replayed(
        &self,
        root: &mut A,
        event_type: &EventType,
        content: &Value,
    ) -> Result<(), HandlerError> {
        let handler = self.handlers.get(event_type).ok_or_else(|| HandlerError::Missing {
            event_type: event_type.clone(),
        })?;

        (handler.on_replayed)(root, content).map_err(|source| HandlerError::Deserialize {
            event_type: event_type.clone(),
            type_name: handler.type_name,
            source,
        })
    }
}

impl<A> fmt::Debug for EventHandlers<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(event_type, handler)| (event_type, handler.type_name)))
            .finish()
    }
}
