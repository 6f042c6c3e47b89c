use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::artifacts::{AggregateRootId, AggregateRootVersion, EventLogSequenceNumber, EventSourceId, EventType};
use crate::event::{CommittedAggregateEvent, CommittedAggregateEvents, CommittedEvent, UncommittedAggregateEvents};
use crate::store::{CommittedAggregateEventsStream, EventStore, EventStoreError};

const DEFAULT_BATCH_SIZE: usize = 100;

type StreamKey = (AggregateRootId, EventSourceId);

#[derive(Default)]
struct InnerInMemoryStore {
    streams: HashMap<StreamKey, Vec<CommittedAggregateEvent>>,
    event_log: Vec<CommittedEvent>,
}

/// An [`EventStore`] keeping everything in memory, with the same ordering and optimistic
/// concurrency rules as the Runtime. Meant for tests and local development.
///
/// The store is protected by an [`Arc`] that allows it to be cloneable still having the same memory
/// reference.
#[derive(Clone)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<InnerInMemoryStore>>,
    batch_size: usize,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(InnerInMemoryStore::default())),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets how many events each fetched batch holds at most.
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..self
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Current version of the given aggregate root instance.
    pub async fn version_of(
        &self,
        aggregate_root_id: AggregateRootId,
        event_source_id: &EventSourceId,
    ) -> AggregateRootVersion {
        let inner = self.inner.read().await;
        stream_version(inner.streams.get(&(aggregate_root_id, event_source_id.clone())))
    }

    /// Every committed event, in commit order.
    pub async fn event_log(&self) -> Vec<CommittedEvent> {
        self.inner.read().await.event_log.clone()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

fn stream_version(stream: Option<&Vec<CommittedAggregateEvent>>) -> AggregateRootVersion {
    stream
        .and_then(|events| events.last())
        .map(|event| event.aggregate_root_version)
        .unwrap_or(AggregateRootVersion::INITIAL)
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    fn fetch_for_aggregate(
        &self,
        aggregate_root_id: AggregateRootId,
        event_source_id: EventSourceId,
        event_types: Vec<EventType>,
        cancellation: CancellationToken,
    ) -> CommittedAggregateEventsStream<'_> {
        let batch_size = self.batch_size;

        let batches = async move {
            if cancellation.is_cancelled() {
                return vec![Err(EventStoreError::Cancelled)];
            }

            let inner = self.inner.read().await;
            let stream = inner.streams.get(&(aggregate_root_id, event_source_id.clone()));
            let aggregate_root_version = stream_version(stream);
            let events: Vec<CommittedAggregateEvent> = stream
                .map(|events| {
                    events
                        .iter()
                        .filter(|event| event_types.contains(&event.event_type))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let batch = |events: Vec<CommittedAggregateEvent>| -> Result<CommittedAggregateEvents, EventStoreError> {
                Ok(CommittedAggregateEvents {
                    event_source_id: event_source_id.clone(),
                    aggregate_root_id,
                    aggregate_root_version,
                    events,
                })
            };

            if events.is_empty() {
                return vec![batch(vec![])];
            }

            events.chunks(batch_size).map(|chunk| batch(chunk.to_vec())).collect()
        };

        Box::pin(futures::stream::once(batches).flat_map(futures::stream::iter))
    }

    #[tracing::instrument(
        skip_all,
        fields(aggregate_root_id = %events.aggregate_root_id, event_source_id = %events.event_source_id),
        err
    )]
    async fn commit_for_aggregate(
        &self,
        events: UncommittedAggregateEvents,
        cancellation: &CancellationToken,
    ) -> Result<CommittedAggregateEvents, EventStoreError> {
        if cancellation.is_cancelled() {
            return Err(EventStoreError::Cancelled);
        }

        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let key = (events.aggregate_root_id, events.event_source_id.clone());
        let stream = inner.streams.entry(key).or_default();

        let actual = stream_version(Some(stream));
        if actual != events.expected_aggregate_root_version {
            return Err(EventStoreError::Conflict {
                aggregate_root_id: events.aggregate_root_id,
                event_source_id: events.event_source_id,
                expected: events.expected_aggregate_root_version,
                actual,
            });
        }

        let occurred = Utc::now();
        let mut version = actual;
        let mut committed = Vec::with_capacity(events.events.len());

        for event in events.events {
            version = version.next();
            let committed_event = CommittedAggregateEvent {
                event_log_sequence_number: EventLogSequenceNumber::new(inner.event_log.len() as u64),
                occurred,
                event_source_id: events.event_source_id.clone(),
                aggregate_root_id: events.aggregate_root_id,
                aggregate_root_version: version,
                event_type: event.event_type,
                content: event.content,
                is_public: event.is_public,
            };

            inner.event_log.push(committed_event.clone().into());
            stream.push(committed_event.clone());
            committed.push(committed_event);
        }

        tracing::debug!(version = %version, committed = committed.len(), "committed events");

        Ok(CommittedAggregateEvents {
            event_source_id: events.event_source_id,
            aggregate_root_id: events.aggregate_root_id,
            aggregate_root_version: version,
            events: committed,
        })
    }
}
