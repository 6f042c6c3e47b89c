use tokio_util::sync::CancellationToken;

use crate::aggregate::AggregateRoot;
use crate::artifacts::{AggregateRootId, AggregateRootVersion, EventSourceId, EventType};
use crate::event::{AppliedEvent, CommittedAggregateEvents, UncommittedAggregateEvents, UncommittedEvent};
use crate::event_types::EventTypes;
use crate::store::{EventStore, EventStoreError};

#[derive(thiserror::Error, Debug)]
pub enum CommitError {
    #[error("{applied} applied events do not fit in aggregate root version {version}")]
    VersionUnderflow {
        version: AggregateRootVersion,
        applied: usize,
    },
    #[error("{type_name} has no associated event type")]
    UnknownEventType { type_name: &'static str },
    #[error("provided event type {provided} does not match event type {associated} associated with {type_name}")]
    ProvidedEventTypeDoesNotMatchAssociated {
        provided: EventType,
        associated: EventType,
        type_name: &'static str,
    },
    #[error("provided event type {provided} of {type_name} is associated with {associated_type_name}")]
    ProvidedEventTypeAssociatedWithOtherType {
        provided: EventType,
        type_name: &'static str,
        associated_type_name: &'static str,
    },
    #[error("could not serialize {type_name}")]
    Serialize {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("committing events failed")]
    Store(#[source] EventStoreError),
    #[error("the event store acknowledged the commit unexpectedly: {reason}")]
    UnexpectedAcknowledgement { reason: String },
    #[error("commit was cancelled")]
    Cancelled,
}

/// Turns the events applied to `root` into the batch to commit.
///
/// The expected version is the version `root` had before any of them were applied.
pub(crate) fn uncommitted_events<A: AggregateRoot>(
    root: &A,
    aggregate_root_id: AggregateRootId,
    event_source_id: &EventSourceId,
    event_types: &EventTypes,
) -> Result<UncommittedAggregateEvents, CommitError> {
    let applied_events = root.applied_events();
    let version = root.version();
    let expected_aggregate_root_version =
        version
            .checked_rewind(applied_events.len())
            .ok_or(CommitError::VersionUnderflow {
                version,
                applied: applied_events.len(),
            })?;

    let events = applied_events
        .iter()
        .map(|applied| {
            Ok(UncommittedEvent {
                event_type: resolve_event_type(applied, event_types)?,
                content: applied.to_content().map_err(|source| CommitError::Serialize {
                    type_name: applied.payload_type_name(),
                    source,
                })?,
                is_public: applied.is_public(),
            })
        })
        .collect::<Result<Vec<_>, CommitError>>()?;

    Ok(UncommittedAggregateEvents {
        event_source_id: event_source_id.clone(),
        aggregate_root_id,
        expected_aggregate_root_version,
        events,
    })
}

fn resolve_event_type(applied: &AppliedEvent, event_types: &EventTypes) -> Result<EventType, CommitError> {
    let type_name = applied.payload_type_name();
    let associated = event_types.get_for_type_id(applied.payload_type_id());

    match (applied.event_type(), associated) {
        (Some(provided), Some(associated)) if provided != associated => {
            Err(CommitError::ProvidedEventTypeDoesNotMatchAssociated {
                provided: provided.clone(),
                associated: associated.clone(),
                type_name,
            })
        }
        (Some(provided), Some(_)) => Ok(provided.clone()),
        (Some(provided), None) => match event_types.type_id_for(provided) {
            Some(type_id) if type_id != applied.payload_type_id() => {
                Err(CommitError::ProvidedEventTypeAssociatedWithOtherType {
                    provided: provided.clone(),
                    type_name,
                    associated_type_name: event_types.type_name_for(provided).unwrap_or_default(),
                })
            }
            _ => Ok(provided.clone()),
        },
        (None, Some(associated)) => Ok(associated.clone()),
        (None, None) => Err(CommitError::UnknownEventType { type_name }),
    }
}

/// Commits the events applied to `root`, if any, and brings its bookkeeping in line with what the
/// event store acknowledged. Nothing is sent when no event was applied.
#[tracing::instrument(
    name = "esrt.commit",
    skip_all,
    fields(aggregate_root_id = %aggregate_root_id, event_source_id = %event_source_id),
    err
)]
pub(crate) async fn commit<A: AggregateRoot>(
    root: &mut A,
    aggregate_root_id: AggregateRootId,
    event_source_id: &EventSourceId,
    event_types: &EventTypes,
    event_store: &dyn EventStore,
    cancellation: &CancellationToken,
) -> Result<Option<CommittedAggregateEvents>, CommitError> {
    if root.applied_events().is_empty() {
        return Ok(None);
    }

    let uncommitted = uncommitted_events(root, aggregate_root_id, event_source_id, event_types)?;

    if cancellation.is_cancelled() {
        return Err(CommitError::Cancelled);
    }

    tracing::debug!(
        events = uncommitted.len(),
        expected_version = %uncommitted.expected_aggregate_root_version,
        "committing applied events"
    );

    let committed = event_store
        .commit_for_aggregate(uncommitted.clone(), cancellation)
        .await
        .map_err(|error| match error {
            EventStoreError::Cancelled => CommitError::Cancelled,
            error => CommitError::Store(error),
        })?;

    verify_acknowledgement(&uncommitted, &committed, root.version())?;

    let base = root.base_mut();
    base.set_version(committed.aggregate_root_version);
    base.clear_applied_events();

    Ok(Some(committed))
}

/// The store is the source of truth for the committed version, provided it acknowledged exactly
/// what was submitted.
fn verify_acknowledgement(
    uncommitted: &UncommittedAggregateEvents,
    committed: &CommittedAggregateEvents,
    local_version: AggregateRootVersion,
) -> Result<(), CommitError> {
    let reason = if committed.aggregate_root_id != uncommitted.aggregate_root_id
        || committed.event_source_id != uncommitted.event_source_id
    {
        format!(
            "acknowledged aggregate root {} with event source {}",
            committed.aggregate_root_id, committed.event_source_id
        )
    } else if committed.len() != uncommitted.len() {
        format!("{} events committed, {} submitted", committed.len(), uncommitted.len())
    } else if committed.aggregate_root_version != local_version {
        format!(
            "committed version {}, local version {}",
            committed.aggregate_root_version, local_version
        )
    } else {
        return Ok(());
    };

    Err(CommitError::UnexpectedAcknowledgement { reason })
}
