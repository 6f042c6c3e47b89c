use std::fmt;
use std::sync::Arc;

use crate::aggregate::{
    AggregateRoot, BoxError, EventHandlers, EventHandlersBuilder, EventSourceIdAlreadySet, RegistrationError,
};
use crate::artifacts::{AggregateRootType, EventSourceId, EventType};
use crate::event_types::EventTypes;

/// How an aggregate root instance is built.
pub enum Constructor<A> {
    /// The constructor takes the event source id and stores it in the [`AggregateRootBase`].
    ///
    /// [`AggregateRootBase`]: crate::aggregate::AggregateRootBase
    WithEventSourceId(fn(EventSourceId) -> Result<A, BoxError>),
    /// The constructor takes nothing; the event source id is set right after construction.
    Default(fn() -> Result<A, BoxError>),
}

impl<A> Constructor<A> {
    pub fn accepts_event_source_id(&self) -> bool {
        matches!(self, Self::WithEventSourceId(_))
    }
}

impl<A> Clone for Constructor<A> {
    fn clone(&self) -> Self {
        match self {
            Self::WithEventSourceId(f) => Self::WithEventSourceId(*f),
            Self::Default(f) => Self::Default(*f),
        }
    }
}

impl<A> fmt::Debug for Constructor<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WithEventSourceId(_) => f.write_str("Constructor::WithEventSourceId"),
            Self::Default(_) => f.write_str("Constructor::Default"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConstructionError {
    #[error("aggregate root {aggregate_root} does not declare an aggregate root type")]
    MissingAggregateRootType { aggregate_root: &'static str },
    #[error("constructor of aggregate root {aggregate_root} failed")]
    Failed {
        aggregate_root: &'static str,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    EventSourceIdAlreadySet(#[from] EventSourceIdAlreadySet),
    #[error("aggregate root {aggregate_root} was constructed for event source {actual:?} instead of {expected}")]
    EventSourceIdMismatch {
        aggregate_root: &'static str,
        expected: EventSourceId,
        actual: Option<EventSourceId>,
    },
}

/// Everything known about an aggregate root type: its identity, how to construct it, and the
/// handlers replaying its history.
///
/// Computed once when the aggregate root is registered in [`AggregateRoots`] and shared by every
/// operation on that type.
///
/// [`AggregateRoots`]: crate::aggregate::AggregateRoots
pub struct AggregateRootMetadata<A> {
    aggregate_root_type: Option<AggregateRootType>,
    constructor: Constructor<A>,
    handlers: Arc<EventHandlers<A>>,
}

impl<A: AggregateRoot> AggregateRootMetadata<A> {
    pub(crate) fn new(event_types: &EventTypes) -> Result<Self, RegistrationError> {
        Ok(Self {
            aggregate_root_type: A::aggregate_root_type(),
            constructor: A::constructor(),
            handlers: Arc::new(A::handlers(EventHandlersBuilder::new()).build(event_types)?),
        })
    }

    /// Name of the Rust type implementing the aggregate root.
    pub fn name(&self) -> &'static str {
        std::any::type_name::<A>()
    }

    pub fn aggregate_root_type(&self) -> Option<&AggregateRootType> {
        self.aggregate_root_type.as_ref()
    }

    pub fn accepts_event_source_id(&self) -> bool {
        self.constructor.accepts_event_source_id()
    }

    pub fn handlers(&self) -> &EventHandlers<A> {
        &self.handlers
    }

    /// An aggregate root without handlers has no state to rebuild.
    pub fn is_stateless(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The event types history has to be filtered by when rehydrating.
    pub fn event_type_filter(&self) -> Vec<EventType> {
        self.handlers.event_types().cloned().collect()
    }

    /// Builds a fresh instance for `event_source_id`, at the initial version and with handlers
    /// attached so that applied events update its state.
    pub fn create(&self, event_source_id: &EventSourceId) -> Result<A, ConstructionError> {
        let aggregate_root = self.name();

        if self.aggregate_root_type.is_none() {
            return Err(ConstructionError::MissingAggregateRootType { aggregate_root });
        }

        let mut root = match &self.constructor {
            Constructor::WithEventSourceId(construct) => construct(event_source_id.clone())
                .map_err(|source| ConstructionError::Failed { aggregate_root, source })?,
            Constructor::Default(construct) => {
                let mut root = construct().map_err(|source| ConstructionError::Failed { aggregate_root, source })?;
                root.base_mut().set_event_source_id(event_source_id.clone())?;
                root
            }
        };

        if root.event_source_id() != Some(event_source_id) {
            return Err(ConstructionError::EventSourceIdMismatch {
                aggregate_root,
                expected: event_source_id.clone(),
                actual: root.event_source_id().cloned(),
            });
        }

        root.base_mut().attach_handlers(Arc::clone(&self.handlers));
        Ok(root)
    }
}

impl<A> fmt::Debug for AggregateRootMetadata<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRootMetadata")
            .field("aggregate_root_type", &self.aggregate_root_type)
            .field("constructor", &self.constructor)
            .field("handlers", &self.handlers)
            .finish()
    }
}
