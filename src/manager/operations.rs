use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::aggregate::{AggregateRoot, AggregateRootMetadata, BoxError, ConstructionError};
use crate::artifacts::{AggregateRootId, AggregateRootVersion, EventSourceId};
use crate::error::{AggregateRootOperationFailed, OperationError};
use crate::event_types::EventTypes;
use crate::manager::commit::commit;
use crate::manager::rehydrate::rehydrate;
use crate::store::EventStore;

/// Where an [`AggregateRootOperations`] is in its cycle.
///
/// `Uninitialized` → `Hydrating` → `Ready` → `Executing` → `Committing` → `Ready`, falling back to
/// `Uninitialized` whenever a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Uninitialized,
    Hydrating,
    Ready,
    Executing,
    Committing,
}

/// Performs actions on one aggregate root instance: rehydrates it, runs the action, and commits
/// whatever the action applied.
///
/// The rehydrated instance is kept between calls so that it is only fetched once, and dropped as
/// soon as anything fails so that the next call starts over from the committed history. Taking
/// `&mut self` makes every call exclusive; concurrent writers on the same event source are told
/// apart by the Runtime through the expected version.
pub struct AggregateRootOperations<A: AggregateRoot> {
    event_source_id: EventSourceId,
    metadata: Arc<AggregateRootMetadata<A>>,
    event_types: Arc<EventTypes>,
    event_store: Arc<dyn EventStore>,
    instance: Option<A>,
    state: OperationState,
}

impl<A: AggregateRoot> AggregateRootOperations<A> {
    pub fn new(
        event_source_id: EventSourceId,
        metadata: Arc<AggregateRootMetadata<A>>,
        event_types: Arc<EventTypes>,
        event_store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            event_source_id,
            metadata,
            event_types,
            event_store,
            instance: None,
            state: OperationState::Uninitialized,
        }
    }

    pub fn event_source_id(&self) -> &EventSourceId {
        &self.event_source_id
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Version of the cached instance, if there is one.
    pub fn version(&self) -> Option<AggregateRootVersion> {
        self.instance.as_ref().map(|root| root.version())
    }

    /// Read-only access to the cached instance, if there is one.
    pub fn instance(&self) -> Option<&A> {
        self.instance.as_ref()
    }

    /// Performs `action` on the aggregate root and commits the events it applied.
    pub async fn perform<F, E>(&mut self, action: F) -> Result<(), AggregateRootOperationFailed>
    where
        F: FnOnce(&mut A) -> Result<(), E> + Send,
        E: Into<BoxError>,
    {
        self.perform_with_cancellation(action, &CancellationToken::new())
            .await
    }

    /// Like [`Self::perform`], giving up as soon as `cancellation` is cancelled. A cancelled operation
    /// counts as failed.
    pub async fn perform_with_cancellation<F, E>(
        &mut self,
        action: F,
        cancellation: &CancellationToken,
    ) -> Result<(), AggregateRootOperationFailed>
    where
        F: FnOnce(&mut A) -> Result<(), E> + Send,
        E: Into<BoxError>,
    {
        let instance = self.instance.take();

        match self.try_perform(instance, action, cancellation).await {
            Ok(root) => {
                self.instance = Some(root);
                self.state = OperationState::Ready;
                Ok(())
            }
            Err(source) => {
                tracing::warn!({
                    aggregate_root = self.metadata.name(),
                    event_source_id = %self.event_source_id,
                    state = ?self.state,
                    error = ?source,
                }, "operation on aggregate root failed, discarding instance");

                self.state = OperationState::Uninitialized;
                Err(AggregateRootOperationFailed {
                    aggregate_root: self.metadata.name(),
                    aggregate_root_type: self.metadata.aggregate_root_type().cloned(),
                    event_source_id: self.event_source_id.clone(),
                    source,
                })
            }
        }
    }

    /// Runs one cycle on `instance`, or on a freshly rehydrated one. The instance is handed back only
    /// on success; on failure it is dropped.
    async fn try_perform<F, E>(
        &mut self,
        instance: Option<A>,
        action: F,
        cancellation: &CancellationToken,
    ) -> Result<A, OperationError>
    where
        F: FnOnce(&mut A) -> Result<(), E> + Send,
        E: Into<BoxError>,
    {
        let aggregate_root_id = self.aggregate_root_id()?;

        let mut root = match instance {
            Some(root) => root,
            None => {
                self.state = OperationState::Hydrating;
                let mut root = self.metadata.create(&self.event_source_id)?;
                rehydrate(
                    &mut root,
                    aggregate_root_id,
                    &self.event_source_id,
                    &self.metadata,
                    self.event_store.as_ref(),
                    cancellation,
                )
                .await?;
                self.state = OperationState::Ready;
                root
            }
        };

        self.state = OperationState::Executing;
        action(&mut root).map_err(|error| OperationError::Action(error.into()))?;

        if !root.applied_events().is_empty() {
            self.state = OperationState::Committing;
            commit(
                &mut root,
                aggregate_root_id,
                &self.event_source_id,
                &self.event_types,
                self.event_store.as_ref(),
                cancellation,
            )
            .await?;
        }

        Ok(root)
    }

    fn aggregate_root_id(&self) -> Result<AggregateRootId, ConstructionError> {
        self.metadata
            .aggregate_root_type()
            .map(|aggregate_root_type| aggregate_root_type.id())
            .ok_or(ConstructionError::MissingAggregateRootType {
                aggregate_root: self.metadata.name(),
            })
    }
}

impl<A: AggregateRoot> fmt::Debug for AggregateRootOperations<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRootOperations")
            .field("aggregate_root", &self.metadata.name())
            .field("event_source_id", &self.event_source_id)
            .field("state", &self.state)
            .field("version", &self.version())
            .finish()
    }
}
