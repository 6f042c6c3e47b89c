//! Client-side aggregate roots for an event-sourcing Runtime.
//!
//! Aggregate roots declare how they are constructed and which events change their state. Performing
//! an action on one fetches its committed history from the Runtime, replays it, runs the action and
//! commits the events it applied, guarded by the version the aggregate root had before.

pub use crate::aggregate::{AggregateRoot, AggregateRootBase, Constructor, EventHandlersBuilder};
pub use crate::artifacts::{AggregateRootId, AggregateRootType, EventSourceId, EventType, EventTypeId, Generation};
pub use crate::error::{AggregateRootOperationFailed, OperationError};
pub use crate::event::Event;
pub use crate::event_types::EventTypes;
pub use crate::manager::{AggregateOf, AggregateRootOperations, Aggregates, OperationState};

pub mod aggregate;
pub mod artifacts;
pub mod error;
pub mod event;
pub mod event_types;
pub mod manager;
pub mod store;

pub mod types {
    pub use crate::artifacts::{AggregateRootVersion, EventLogSequenceNumber};
}
