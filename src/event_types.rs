use std::any::TypeId;
use std::collections::HashMap;

use crate::artifacts::EventType;
use crate::event::Event;

#[derive(thiserror::Error, Debug)]
pub enum EventTypesError {
    #[error("{type_name} is already associated with event type {existing}")]
    TypeAlreadyAssociated {
        type_name: &'static str,
        existing: EventType,
    },
    #[error("event type {event_type} is already associated with {type_name}")]
    EventTypeAlreadyAssociated {
        event_type: EventType,
        type_name: &'static str,
    },
}

#[derive(Debug, Clone)]
struct Association {
    type_id: TypeId,
    type_name: &'static str,
}

/// Associations between Rust event types and the [`EventType`]s the Runtime knows them by.
///
/// Built once while setting up the client and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct EventTypes {
    by_type: HashMap<TypeId, EventType>,
    by_event_type: HashMap<EventType, Association>,
}

impl EventTypes {
    pub fn builder() -> EventTypesBuilder {
        EventTypesBuilder::default()
    }

    pub fn get_for<E: Event>(&self) -> Option<&EventType> {
        self.get_for_type_id(TypeId::of::<E>())
    }

    pub fn get_for_type_id(&self, type_id: TypeId) -> Option<&EventType> {
        self.by_type.get(&type_id)
    }

    pub fn has_for<E: Event>(&self) -> bool {
        self.has_for_type_id(TypeId::of::<E>())
    }

    pub fn has_for_type_id(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    /// Name of the Rust type associated with `event_type`.
    pub fn type_name_for(&self, event_type: &EventType) -> Option<&'static str> {
        self.by_event_type.get(event_type).map(|a| a.type_name)
    }

    pub(crate) fn type_id_for(&self, event_type: &EventType) -> Option<TypeId> {
        self.by_event_type.get(event_type).map(|a| a.type_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventType> {
        self.by_event_type.keys()
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

/// Struct used to build a brand new [`EventTypes`].
#[derive(Debug, Default)]
pub struct EventTypesBuilder {
    event_types: EventTypes,
}

impl EventTypesBuilder {
    /// Associate `E` with `event_type`. Each Rust type and each event type can only be associated once.
    pub fn associate<E: Event>(mut self, event_type: EventType) -> Result<Self, EventTypesError> {
        let type_id = TypeId::of::<E>();
        let type_name = std::any::type_name::<E>();

        if let Some(existing) = self.event_types.by_type.get(&type_id) {
            return Err(EventTypesError::TypeAlreadyAssociated {
                type_name,
                existing: existing.clone(),
            });
        }

        if let Some(association) = self.event_types.by_event_type.get(&event_type) {
            return Err(EventTypesError::EventTypeAlreadyAssociated {
                event_type,
                type_name: association.type_name,
            });
        }

        tracing::trace!(%event_type, type_name, "associated event type");

        self.event_types.by_type.insert(type_id, event_type.clone());
        self.event_types
            .by_event_type
            .insert(event_type, Association { type_id, type_name });

        Ok(self)
    }

    pub fn build(self) -> EventTypes {
        self.event_types
    }
}
