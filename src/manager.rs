use std::fmt;
use std::sync::Arc;

use typed_builder::TypedBuilder;

pub use commit::CommitError;
pub use operations::{AggregateRootOperations, OperationState};
pub use rehydrate::RehydrationError;

use crate::aggregate::{AggregateRoot, AggregateRootMetadata, AggregateRoots};
use crate::artifacts::EventSourceId;
use crate::error::UnregisteredAggregateRoot;
use crate::event_types::EventTypes;
use crate::store::EventStore;

mod commit;
mod operations;
mod rehydrate;

/// Aggregates couples the registered aggregate roots with an event store, so that actions performed
/// on aggregate roots are replayed from and committed to it.
///
/// The basic API is:
/// 1. of, to get hold of an aggregate root type
/// 2. get, to perform actions on one aggregate root instance
///
/// ```ignore
/// let aggregates = Aggregates::builder()
///     .event_store(Arc::new(InMemoryEventStore::new()))
///     .aggregate_roots(Arc::new(aggregate_roots))
///     .build();
///
/// aggregates
///     .get::<Person>("agg-1")?
///     .perform(|person| person.rename("Bob"))
///     .await?;
/// ```
#[derive(TypedBuilder, Clone)]
pub struct Aggregates {
    event_store: Arc<dyn EventStore>,
    aggregate_roots: Arc<AggregateRoots>,
}

impl Aggregates {
    /// Returns the factory of [`AggregateRootOperations`] for `A`.
    pub fn of<A: AggregateRoot>(&self) -> Result<AggregateOf<A>, UnregisteredAggregateRoot> {
        let metadata = self
            .aggregate_roots
            .metadata::<A>()
            .ok_or(UnregisteredAggregateRoot {
                aggregate_root: std::any::type_name::<A>(),
            })?;

        Ok(AggregateOf {
            metadata,
            event_types: Arc::clone(self.aggregate_roots.event_types()),
            event_store: Arc::clone(&self.event_store),
        })
    }

    /// Shorthand for `of::<A>()?.get(event_source_id)`.
    pub fn get<A: AggregateRoot>(
        &self,
        event_source_id: impl Into<EventSourceId>,
    ) -> Result<AggregateRootOperations<A>, UnregisteredAggregateRoot> {
        Ok(self.of::<A>()?.get(event_source_id))
    }

    pub fn aggregate_roots(&self) -> &AggregateRoots {
        &self.aggregate_roots
    }

    /// Returns the internal event store
    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.event_store
    }
}

impl fmt::Debug for Aggregates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregates")
            .field("aggregate_roots", &self.aggregate_roots)
            .finish()
    }
}

/// Hands out [`AggregateRootOperations`] for the instances of one aggregate root type.
pub struct AggregateOf<A: AggregateRoot> {
    metadata: Arc<AggregateRootMetadata<A>>,
    event_types: Arc<EventTypes>,
    event_store: Arc<dyn EventStore>,
}

impl<A: AggregateRoot> AggregateOf<A> {
    /// Operations on the instance with the given event source id. Each call returns operations with
    /// their own, initially empty, instance cache.
    pub fn get(&self, event_source_id: impl Into<EventSourceId>) -> AggregateRootOperations<A> {
        AggregateRootOperations::new(
            event_source_id.into(),
            Arc::clone(&self.metadata),
            Arc::clone(&self.event_types),
            Arc::clone(&self.event_store),
        )
    }

    pub fn metadata(&self) -> &AggregateRootMetadata<A> {
        &self.metadata
    }
}

impl<A: AggregateRoot> Clone for AggregateOf<A> {
    fn clone(&self) -> Self {
        Self {
            metadata: Arc::clone(&self.metadata),
            event_types: Arc::clone(&self.event_types),
            event_store: Arc::clone(&self.event_store),
        }
    }
}

impl<A: AggregateRoot> fmt::Debug for AggregateOf<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateOf").field("metadata", &self.metadata).finish()
    }
}
