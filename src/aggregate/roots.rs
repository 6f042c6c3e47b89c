use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregate::{AggregateRoot, AggregateRootMetadata};
use crate::artifacts::{AggregateRootId, AggregateRootType, EventType};
use crate::event_types::EventTypes;

#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    #[error("aggregate root {aggregate_root} is already registered")]
    AlreadyRegistered { aggregate_root: &'static str },
    #[error("aggregate root id {id} of {aggregate_root} is already used by {existing}")]
    DuplicateAggregateRootId {
        id: AggregateRootId,
        aggregate_root: &'static str,
        existing: &'static str,
    },
    #[error("aggregate root {aggregate_root} handles {type_name}, which has no associated event type")]
    UnknownEventType {
        aggregate_root: &'static str,
        type_name: &'static str,
    },
    #[error("aggregate root {aggregate_root} registers more than one handler for event type {event_type}")]
    DuplicateHandler {
        aggregate_root: &'static str,
        event_type: EventType,
    },
}

struct Registration {
    name: &'static str,
    aggregate_root_type: Option<AggregateRootType>,
    metadata: Arc<dyn Any + Send + Sync>,
}

/// The aggregate roots known to a client, each with its [`AggregateRootMetadata`].
///
/// Built once while setting up the client; the metadata it hands out is shared, never rebuilt.
pub struct AggregateRoots {
    event_types: Arc<EventTypes>,
    registrations: HashMap<TypeId, Registration>,
    by_id: HashMap<AggregateRootId, TypeId>,
}

impl AggregateRoots {
    pub fn builder(event_types: Arc<EventTypes>) -> AggregateRootsBuilder {
        AggregateRootsBuilder {
            roots: AggregateRoots {
                event_types,
                registrations: HashMap::new(),
                by_id: HashMap::new(),
            },
        }
    }

    pub fn event_types(&self) -> &Arc<EventTypes> {
        &self.event_types
    }

    pub fn metadata<A: AggregateRoot>(&self) -> Option<Arc<AggregateRootMetadata<A>>> {
        let registration = self.registrations.get(&TypeId::of::<A>())?;
        Arc::clone(&registration.metadata)
            .downcast::<AggregateRootMetadata<A>>()
            .ok()
    }

    pub fn is_registered<A: AggregateRoot>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<A>())
    }

    /// The aggregate root type registered under `id`.
    pub fn get(&self, id: &AggregateRootId) -> Option<&AggregateRootType> {
        self.by_id
            .get(id)
            .and_then(|type_id| self.registrations.get(type_id))
            .and_then(|registration| registration.aggregate_root_type.as_ref())
    }

    /// Name of the Rust type registered under `id`.
    pub fn name_of(&self, id: &AggregateRootId) -> Option<&'static str> {
        self.by_id
            .get(id)
            .and_then(|type_id| self.registrations.get(type_id))
            .map(|registration| registration.name)
    }

    /// Every declared aggregate root type, which is what gets registered with the Runtime.
    pub fn aggregate_root_types(&self) -> impl Iterator<Item = &AggregateRootType> {
        self.registrations
            .values()
            .filter_map(|registration| registration.aggregate_root_type.as_ref())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl std::fmt::Debug for AggregateRoots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.registrations
                    .values()
                    .map(|registration| (registration.name, &registration.aggregate_root_type)),
            )
            .finish()
    }
}

/// Struct used to build a brand new [`AggregateRoots`].
pub struct AggregateRootsBuilder {
    roots: AggregateRoots,
}

impl AggregateRootsBuilder {
    /// Registers `A`, building its metadata against the event types of the registry.
    pub fn register<A: AggregateRoot>(mut self) -> Result<Self, RegistrationError> {
        let type_id = TypeId::of::<A>();
        let name = std::any::type_name::<A>();

        if self.roots.registrations.contains_key(&type_id) {
            return Err(RegistrationError::AlreadyRegistered { aggregate_root: name });
        }

        let metadata = AggregateRootMetadata::<A>::new(&self.roots.event_types)?;
        let aggregate_root_type = metadata.aggregate_root_type().cloned();

        if let Some(aggregate_root_type) = &aggregate_root_type {
            let id = aggregate_root_type.id();
            if let Some(existing) = self.roots.name_of(&id) {
                return Err(RegistrationError::DuplicateAggregateRootId {
                    id,
                    aggregate_root: name,
                    existing,
                });
            }
            self.roots.by_id.insert(id, type_id);
        }

        tracing::debug!(
            aggregate_root = name,
            stateless = metadata.is_stateless(),
            handlers = metadata.handlers().len(),
            "registered aggregate root"
        );

        self.roots.registrations.insert(
            type_id,
            Registration {
                name,
                aggregate_root_type,
                metadata: Arc::new(metadata),
            },
        );

        Ok(self)
    }

    pub fn build(self) -> AggregateRoots {
        self.roots
    }
}
