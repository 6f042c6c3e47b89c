use std::any::{Any, TypeId};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifacts::{
    AggregateRootId, AggregateRootVersion, EventLogSequenceNumber, EventSourceId, EventType,
};

/// Anything that can be applied to an aggregate root and sent to the Runtime.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Event for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Object safe view of an [`Event`], used to buffer events of different types together.
trait ErasedEvent: Send + Sync {
    fn payload_type_id(&self) -> TypeId;

    fn payload_type_name(&self) -> &'static str;

    fn to_content(&self) -> Result<Value, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;
}

impl<E: Event> ErasedEvent for E {
    fn payload_type_id(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn payload_type_name(&self) -> &'static str {
        std::any::type_name::<E>()
    }

    fn to_content(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An event applied to an aggregate root during an operation and not yet committed.
pub struct AppliedEvent {
    payload: Box<dyn ErasedEvent>,
    event_type: Option<EventType>,
    is_public: bool,
}

impl AppliedEvent {
    pub(crate) fn new<E: Event>(payload: E, event_type: Option<EventType>, is_public: bool) -> Self {
        Self {
            payload: Box::new(payload),
            event_type,
            is_public,
        }
    }

    /// The event type explicitly given when the event was applied, if any.
    pub fn event_type(&self) -> Option<&EventType> {
        self.event_type.as_ref()
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn payload_type_id(&self) -> TypeId {
        self.payload.payload_type_id()
    }

    pub fn payload_type_name(&self) -> &'static str {
        self.payload.payload_type_name()
    }

    /// Returns the payload if it is an `E`.
    pub fn payload<E: Event>(&self) -> Option<&E> {
        self.payload.as_any().downcast_ref::<E>()
    }

    pub(crate) fn to_content(&self) -> Result<Value, serde_json::Error> {
        self.payload.to_content()
    }
}

impl fmt::Debug for AppliedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppliedEvent")
            .field("payload_type", &self.payload_type_name())
            .field("event_type", &self.event_type)
            .field("is_public", &self.is_public)
            .finish()
    }
}

/// An event ready to be committed: its type, its serialized content and its visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_type: EventType,
    pub content: Value,
    pub is_public: bool,
}

/// The batch of events an aggregate root commits in one go.
///
/// `expected_aggregate_root_version` is the version the aggregate root had before any of `events`
/// were applied; the Runtime rejects the commit if its stream is at a different version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedAggregateEvents {
    pub event_source_id: EventSourceId,
    pub aggregate_root_id: AggregateRootId,
    pub expected_aggregate_root_version: AggregateRootVersion,
    pub events: Vec<UncommittedEvent>,
}

impl UncommittedAggregateEvents {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// An event the Runtime has durably accepted and sequenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedEvent {
    pub event_log_sequence_number: EventLogSequenceNumber,
    pub occurred: DateTime<Utc>,
    pub event_source_id: EventSourceId,
    pub event_type: EventType,
    pub content: Value,
    pub is_public: bool,
}

impl CommittedEvent {
    /// Deserializes the content into `E`.
    pub fn content_as<E: Event>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_value(self.content.clone())
    }
}

/// A committed event that was applied by an aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedAggregateEvent {
    pub event_log_sequence_number: EventLogSequenceNumber,
    pub occurred: DateTime<Utc>,
    pub event_source_id: EventSourceId,
    pub aggregate_root_id: AggregateRootId,
    /// The version of the aggregate root right after this event was applied.
    pub aggregate_root_version: AggregateRootVersion,
    pub event_type: EventType,
    pub content: Value,
    pub is_public: bool,
}

impl CommittedAggregateEvent {
    /// Deserializes the content into `E`.
    pub fn content_as<E: Event>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_value(self.content.clone())
    }
}

impl From<CommittedAggregateEvent> for CommittedEvent {
    fn from(event: CommittedAggregateEvent) -> Self {
        Self {
            event_log_sequence_number: event.event_log_sequence_number,
            occurred: event.occurred,
            event_source_id: event.event_source_id,
            event_type: event.event_type,
            content: event.content,
            is_public: event.is_public,
        }
    }
}

/// A batch of committed events for one aggregate root instance.
///
/// `aggregate_root_version` is the version of the whole stream as known by the Runtime, which may be
/// ahead of the last event in `events` when the batch was filtered by event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedAggregateEvents {
    pub event_source_id: EventSourceId,
    pub aggregate_root_id: AggregateRootId,
    pub aggregate_root_version: AggregateRootVersion,
    pub events: Vec<CommittedAggregateEvent>,
}

impl CommittedAggregateEvents {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
