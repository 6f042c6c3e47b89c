use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{AggregateRoot, AggregateRootMetadata, HandlerError};
use crate::artifacts::{AggregateRootId, EventLogSequenceNumber, EventSourceId};
use crate::store::{EventStore, EventStoreError};

#[derive(thiserror::Error, Debug)]
pub enum RehydrationError {
    #[error("fetching committed events failed")]
    Fetch(#[source] EventStoreError),
    #[error("replaying event {event_log_sequence_number} failed")]
    Replay {
        event_log_sequence_number: EventLogSequenceNumber,
        #[source]
        source: HandlerError,
    },
    #[error("received events of aggregate root {aggregate_root_id} with event source {event_source_id}")]
    UnexpectedBatch {
        aggregate_root_id: AggregateRootId,
        event_source_id: EventSourceId,
    },
    #[error("rehydration was cancelled")]
    Cancelled,
}

/// Replays the committed history of `root` onto it, batch after batch and event after event, in the
/// order the event store returns them.
///
/// Stateless aggregate roots have nothing to replay, so nothing is fetched for them.
#[tracing::instrument(
    name = "esrt.rehydrate",
    skip_all,
    fields(aggregate_root = metadata.name(), event_source_id = %event_source_id),
    err
)]
pub(crate) async fn rehydrate<A: AggregateRoot>(
    root: &mut A,
    aggregate_root_id: AggregateRootId,
    event_source_id: &EventSourceId,
    metadata: &AggregateRootMetadata<A>,
    event_store: &dyn EventStore,
    cancellation: &CancellationToken,
) -> Result<(), RehydrationError> {
    if metadata.is_stateless() {
        tracing::trace!("aggregate root is stateless, skipping fetch");
        return Ok(());
    }

    if cancellation.is_cancelled() {
        return Err(RehydrationError::Cancelled);
    }

    let mut batches = event_store.fetch_for_aggregate(
        aggregate_root_id,
        event_source_id.clone(),
        metadata.event_type_filter(),
        cancellation.clone(),
    );

    let mut reported_version = None;
    let mut replayed: usize = 0;

    while let Some(batch) = batches.next().await {
        if cancellation.is_cancelled() {
            return Err(RehydrationError::Cancelled);
        }

        let batch = batch.map_err(|error| match error {
            EventStoreError::Cancelled => RehydrationError::Cancelled,
            error => RehydrationError::Fetch(error),
        })?;

        if batch.aggregate_root_id != aggregate_root_id || &batch.event_source_id != event_source_id {
            return Err(RehydrationError::UnexpectedBatch {
                aggregate_root_id: batch.aggregate_root_id,
                event_source_id: batch.event_source_id,
            });
        }

        tracing::trace!(events = batch.len(), "replaying batch");

        for event in &batch.events {
            metadata
                .handlers()
                .on_replayed(root, &event.event_type, &event.content)
                .map_err(|source| RehydrationError::Replay {
                    event_log_sequence_number: event.event_log_sequence_number,
                    source,
                })?;
            root.base_mut().replayed();
            replayed += 1;
        }

        reported_version = Some(batch.aggregate_root_version);
    }

    // Events of types without a handler were filtered out by the store, yet they still count.
    if let Some(reported_version) = reported_version {
        if reported_version > root.version() {
            root.base_mut().set_version(reported_version);
        }
    }

    tracing::debug!(replayed, version = %root.version(), "rehydrated aggregate root");
    Ok(())
}
