pub use crate::aggregate::{BoxError, ConstructionError, EventSourceIdAlreadySet, HandlerError, RegistrationError};
pub use crate::event_types::EventTypesError;
pub use crate::manager::{CommitError, RehydrationError};
pub use crate::store::EventStoreError;

use crate::artifacts::{AggregateRootType, EventSourceId};

/// The one error every failed operation on an aggregate root ends up as, whatever stage failed.
#[derive(thiserror::Error, Debug)]
#[error("operation on aggregate root {aggregate_root} with event source {event_source_id} failed: {source}")]
pub struct AggregateRootOperationFailed {
    pub aggregate_root: &'static str,
    pub aggregate_root_type: Option<AggregateRootType>,
    pub event_source_id: EventSourceId,
    #[source]
    pub source: OperationError,
}

#[derive(thiserror::Error, Debug)]
pub enum OperationError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error(transparent)]
    Rehydration(#[from] RehydrationError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    /// The action performed on the aggregate root returned an error.
    #[error("the performed action failed: {0}")]
    Action(#[source] BoxError),
}

#[derive(thiserror::Error, Debug)]
#[error("aggregate root {aggregate_root} is not registered")]
pub struct UnregisteredAggregateRoot {
    pub aggregate_root: &'static str,
}
