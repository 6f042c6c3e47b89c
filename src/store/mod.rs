use std::ops::Deref;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::artifacts::{AggregateRootId, AggregateRootVersion, EventSourceId, EventType};
use crate::event::{CommittedAggregateEvents, UncommittedAggregateEvents};

#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryEventStore;

#[cfg(feature = "in-memory")]
mod in_memory;

#[derive(thiserror::Error, Debug)]
pub enum EventStoreError {
    /// The stream was not at the version the commit expected it to be.
    #[error(
        "aggregate root {aggregate_root_id} with event source {event_source_id} is at version {actual}, \
         expected {expected}"
    )]
    Conflict {
        aggregate_root_id: AggregateRootId,
        event_source_id: EventSourceId,
        expected: AggregateRootVersion,
        actual: AggregateRootVersion,
    },
    #[error("the request to the event store was cancelled")]
    Cancelled,
    /// The Runtime processed the request and reported a failure.
    #[error("the event store reported a failure: {reason}")]
    Failure { reason: String },
    /// The request never made it to the Runtime, or its response never made it back.
    #[error(transparent)]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

/// Lazily fetched history of an aggregate root instance, one batch at a time.
pub type CommittedAggregateEventsStream<'a> = BoxStream<'a, Result<CommittedAggregateEvents, EventStoreError>>;

/// An EventStore is the client side of the Runtime's event store: it loads the committed events of an
/// aggregate root instance and commits the new ones.
///
/// Ordering and optimistic concurrency are the Runtime's job, implementations only carry requests to it.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Streams the committed events of the given aggregate root instance, restricted to
    /// `event_types`, in the order the Runtime committed them.
    ///
    /// The stream is finite and cannot be resumed: fetching again starts over from the first event.
    /// Implementations yield at least one batch, carrying the current version of the stream even
    /// when no event matches.
    fn fetch_for_aggregate(
        &self,
        aggregate_root_id: AggregateRootId,
        event_source_id: EventSourceId,
        event_types: Vec<EventType>,
        cancellation: CancellationToken,
    ) -> CommittedAggregateEventsStream<'_>;

    /// Commits a batch of events, provided the stream is at the expected version. Either all events
    /// are committed, or none are.
    async fn commit_for_aggregate(
        &self,
        events: UncommittedAggregateEvents,
        cancellation: &CancellationToken,
    ) -> Result<CommittedAggregateEvents, EventStoreError>;
}

/// Blanket implementation making an [`EventStore`] every (smart) pointer to an [`EventStore`],
/// e.g. `&Store`, `Box<Store>`, `Arc<dyn EventStore>`.
#[async_trait]
impl<S, T> EventStore for T
where
    S: EventStore + ?Sized + 'static,
    T: Deref<Target = S> + Send + Sync,
{
    /// Deref call to [`EventStore::fetch_for_aggregate`].
    fn fetch_for_aggregate(
        &self,
        aggregate_root_id: AggregateRootId,
        event_source_id: EventSourceId,
        event_types: Vec<EventType>,
        cancellation: CancellationToken,
    ) -> CommittedAggregateEventsStream<'_> {
        self.deref()
            .fetch_for_aggregate(aggregate_root_id, event_source_id, event_types, cancellation)
    }

    /// Deref call to [`EventStore::commit_for_aggregate`].
    async fn commit_for_aggregate(
        &self,
        events: UncommittedAggregateEvents,
        cancellation: &CancellationToken,
    ) -> Result<CommittedAggregateEvents, EventStoreError> {
        self.deref().commit_for_aggregate(events, cancellation).await
    }
}
