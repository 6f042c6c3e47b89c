use std::sync::Arc;

use rand::Rng;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use esrt::error::{CommitError, ConstructionError, EventStoreError, HandlerError, RehydrationError};
use esrt::store::InMemoryEventStore;
use esrt::types::AggregateRootVersion;
use esrt::{AggregateRoot, Aggregates, EventSourceId, EventType, OperationError, OperationState};

use crate::aggregate::*;
use crate::recording::RecordingEventStore;

fn setup() -> (Aggregates, Arc<RecordingEventStore>) {
    setup_with_store(InMemoryEventStore::new())
}

fn setup_with_store(store: InMemoryEventStore) -> (Aggregates, Arc<RecordingEventStore>) {
    let store = Arc::new(RecordingEventStore::new(store));
    let aggregates = Aggregates::builder()
        .event_store(store.clone())
        .aggregate_roots(Arc::new(aggregate_roots()))
        .build();

    (aggregates, store)
}

#[tokio::test]
async fn renaming_a_fresh_person_commits_one_event() {
    let (aggregates, store) = setup();
    let mut person = aggregates.get::<Person>("agg-1").unwrap();
    assert_eq!(person.state(), OperationState::Uninitialized);

    person.perform(|person| person.rename("Bob")).await.unwrap();

    assert_eq!(store.fetches(), 1);
    assert_eq!(store.commits(), 1);

    let committed = store.committed();
    let batch = &committed[0];
    assert_eq!(batch.aggregate_root_id, PERSON_ID);
    assert_eq!(batch.event_source_id, EventSourceId::from("agg-1"));
    assert_eq!(batch.expected_aggregate_root_version, AggregateRootVersion::INITIAL);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.events[0].event_type, renamed());
    assert_eq!(batch.events[0].content, json!({ "name": "Bob" }));
    assert!(!batch.events[0].is_public);

    assert_eq!(person.state(), OperationState::Ready);
    assert_eq!(person.version(), Some(AggregateRootVersion::new(1)));
    let instance = person.instance().unwrap();
    assert_eq!(instance.name.as_deref(), Some("Bob"));
    assert!(instance.applied_events().is_empty());
}

#[tokio::test]
async fn history_is_replayed_before_the_action() {
    let (aggregates, store) = setup();
    let event_source_id = EventSourceId::from("agg-2");
    store
        .seed(
            COUNTER_ID,
            &event_source_id,
            vec![(incremented(), Incremented), (incremented(), Incremented), (incremented(), Incremented)],
        )
        .await;

    let mut counter = aggregates.get::<Counter>(event_source_id).unwrap();
    counter.perform(|counter| counter.increment()).await.unwrap();

    assert_eq!(store.fetches(), 1);
    assert_eq!(store.commits(), 1);
    assert_eq!(store.committed()[0].expected_aggregate_root_version, AggregateRootVersion::new(3));
    assert_eq!(counter.instance().unwrap().count, 4);
    assert_eq!(counter.version(), Some(AggregateRootVersion::new(4)));
}

#[tokio::test]
async fn history_is_replayed_in_order_across_batches() {
    let (aggregates, store) = setup_with_store(InMemoryEventStore::new().with_batch_size(3));
    let mut rng = rand::thread_rng();

    for round in 0..10 {
        let event_source_id = EventSourceId::from(format!("counter-{}", round));
        let length = rng.gen_range(1..=25);
        let history: Vec<bool> = (0..length).map(|_| rng.gen_bool(0.5)).collect();
        let expected = history
            .iter()
            .fold(0u64, |count, &increment| if increment { count + 1 } else { count * 2 });

        let events: Vec<(EventType, Option<()>)> = history
            .iter()
            .map(|&increment| (if increment { incremented() } else { doubled() }, None))
            .collect();
        store.seed(COUNTER_ID, &event_source_id, events).await;

        let mut counter = aggregates.get::<Counter>(event_source_id).unwrap();
        counter.perform(|_| Ok::<_, TestError>(())).await.unwrap();

        assert_eq!(counter.instance().unwrap().count, expected);
        assert_eq!(counter.version(), Some(AggregateRootVersion::new(length)));
    }

    assert_eq!(store.commits(), 0);
}

#[tokio::test]
async fn swapping_two_events_changes_the_rehydrated_state() {
    let (aggregates, store) = setup();
    let forwards = EventSourceId::from("forwards");
    let backwards = EventSourceId::from("backwards");
    store
        .seed(COUNTER_ID, &forwards, vec![(incremented(), ()), (doubled(), ())])
        .await;
    store
        .seed(COUNTER_ID, &backwards, vec![(doubled(), ()), (incremented(), ())])
        .await;

    let mut first = aggregates.get::<Counter>(forwards).unwrap();
    let mut second = aggregates.get::<Counter>(backwards).unwrap();
    first.perform(|_| Ok::<_, TestError>(())).await.unwrap();
    second.perform(|_| Ok::<_, TestError>(())).await.unwrap();

    assert_eq!(first.instance().unwrap().count, 2);
    assert_eq!(second.instance().unwrap().count, 1);
}

#[tokio::test]
async fn actions_applying_nothing_commit_nothing() {
    let (aggregates, store) = setup();
    let mut person = aggregates.get::<Person>("idle").unwrap();

    person.perform(|_| Ok::<_, TestError>(())).await.unwrap();

    assert_eq!(store.fetches(), 1);
    assert_eq!(store.commits(), 0);
    assert_eq!(person.version(), Some(AggregateRootVersion::INITIAL));
}

#[tokio::test]
async fn expected_version_covers_every_applied_event() {
    let (aggregates, store) = setup();
    let mut counter = aggregates.get::<Counter>("hundred").unwrap();

    counter
        .perform(|counter| (0..100).try_for_each(|_| counter.increment()))
        .await
        .unwrap();
    counter.perform(|counter| counter.double()).await.unwrap();

    let committed = store.committed();
    assert_eq!(committed[0].len(), 100);
    assert_eq!(committed[0].expected_aggregate_root_version, AggregateRootVersion::INITIAL);
    assert_eq!(committed[1].expected_aggregate_root_version, AggregateRootVersion::new(100));
    assert_eq!(counter.instance().unwrap().count, 200);
    assert_eq!(counter.version(), Some(AggregateRootVersion::new(101)));
}

#[tokio::test]
async fn rehydrated_instances_are_reused() {
    let (aggregates, store) = setup();
    let mut person = aggregates.get::<Person>("reused").unwrap();

    person.perform(|person| person.rename("Alice")).await.unwrap();
    person.perform(|person| person.rename("Bob")).await.unwrap();

    assert_eq!(store.fetches(), 1);
    assert_eq!(store.commits(), 2);
    assert_eq!(store.committed()[1].expected_aggregate_root_version, AggregateRootVersion::new(1));
    assert_eq!(person.version(), Some(AggregateRootVersion::new(2)));
}

#[tokio::test]
async fn stateless_aggregate_roots_are_never_fetched() {
    let (aggregates, store) = setup();
    let event_source_id = EventSourceId::from("pinger");
    let history: Vec<_> = (0..50).map(|at| (pinged(), Pinged { at })).collect();
    store.seed(PINGER_ID, &event_source_id, history).await;

    let mut pinger = aggregates.get::<Pinger>(event_source_id).unwrap();
    pinger.perform(|_| Ok::<_, TestError>(())).await.unwrap();

    assert_eq!(store.fetches(), 0);
    assert_eq!(pinger.version(), Some(AggregateRootVersion::INITIAL));
}

#[tokio::test]
async fn stateless_aggregate_roots_commit_public_events() {
    let (aggregates, store) = setup();
    let mut pinger = aggregates.get::<Pinger>("fresh-pinger").unwrap();

    pinger.perform(|pinger| pinger.ping(7)).await.unwrap();

    assert_eq!(store.fetches(), 0);
    assert_eq!(store.commits(), 1);
    let committed = store.committed();
    assert_eq!(committed[0].events[0].event_type, pinged());
    assert_eq!(committed[0].events[0].content, json!({ "at": 7 }));
    assert!(committed[0].events[0].is_public);
    assert_eq!(store.inner.event_log().await.len(), 1);
}

#[tokio::test]
async fn conflicts_discard_the_cached_instance() {
    let (aggregates, store) = setup();
    let event_source_id = EventSourceId::from("contended");
    let mut person = aggregates.get::<Person>(event_source_id.clone()).unwrap();
    person.perform(|person| person.rename("Alice")).await.unwrap();

    // Another writer gets there first.
    store
        .seed(
            PERSON_ID,
            &event_source_id,
            vec![(renamed(), Renamed { name: "Carol".to_string() })],
        )
        .await;

    let error = person.perform(|person| person.rename("Bob")).await.unwrap_err();

    assert!(matches!(
        error.source,
        OperationError::Commit(CommitError::Store(EventStoreError::Conflict { .. }))
    ));
    assert_eq!(error.event_source_id, event_source_id);
    assert_eq!(person.state(), OperationState::Uninitialized);
    assert!(person.instance().is_none());

    person.perform(|person| person.rename("Bob")).await.unwrap();

    assert_eq!(store.fetches(), 2);
    assert_eq!(store.committed()[2].expected_aggregate_root_version, AggregateRootVersion::new(2));
    assert_eq!(person.version(), Some(AggregateRootVersion::new(3)));
    assert_eq!(person.instance().unwrap().name.as_deref(), Some("Bob"));
}

#[tokio::test]
async fn store_failures_discard_the_cached_instance() {
    let (aggregates, store) = setup();
    let mut person = aggregates.get::<Person>("flaky").unwrap();
    person.perform(|person| person.rename("Alice")).await.unwrap();

    store.fail_next_commit(EventStoreError::Failure {
        reason: "unavailable".to_string(),
    });
    let error = person.perform(|person| person.rename("Bob")).await.unwrap_err();

    assert!(matches!(
        error.source,
        OperationError::Commit(CommitError::Store(EventStoreError::Failure { .. }))
    ));

    person.perform(|person| person.rename("Bob")).await.unwrap();

    assert_eq!(store.fetches(), 2);
    assert_eq!(person.version(), Some(AggregateRootVersion::new(2)));
}

#[tokio::test]
async fn failing_actions_discard_what_they_applied() {
    let (aggregates, store) = setup();
    let mut counter = aggregates.get::<Counter>("refusing").unwrap();

    let error = counter
        .perform(|counter| {
            counter.increment()?;
            Err(TestError::Refused)
        })
        .await
        .unwrap_err();

    match &error.source {
        OperationError::Action(source) => {
            assert!(matches!(source.downcast_ref::<TestError>(), Some(TestError::Refused)))
        }
        other => panic!("expected the action to fail, got {:?}", other),
    }
    assert_eq!(store.commits(), 0);
    assert!(counter.instance().is_none());

    counter.perform(|counter| counter.increment()).await.unwrap();

    assert_eq!(store.fetches(), 2);
    assert_eq!(counter.instance().unwrap().count, 1);
    assert_eq!(counter.version(), Some(AggregateRootVersion::new(1)));
}

#[tokio::test]
async fn mismatching_event_types_are_not_committed() {
    let (aggregates, store) = setup();
    let mut person = aggregates.get::<Person>("mismatch").unwrap();

    let error = person
        .perform(|person| {
            person.apply_with_type(Renamed { name: "Bob".to_string() }, incremented());
            Ok::<_, TestError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(
        error.source,
        OperationError::Commit(CommitError::ProvidedEventTypeDoesNotMatchAssociated { .. })
    ));
    assert_eq!(store.commits(), 0);
}

#[tokio::test]
async fn event_types_of_other_events_are_not_committed() {
    let (aggregates, store) = setup();
    let mut person = aggregates.get::<Person>("mislabelled").unwrap();

    let error = person
        .perform(|person| {
            person.apply_with_type(Bogus { x: 1 }, renamed());
            Ok::<_, TestError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(
        error.source,
        OperationError::Commit(CommitError::ProvidedEventTypeAssociatedWithOtherType { .. })
    ));
    assert_eq!(store.commits(), 0);

    // The stream stays loadable.
    person.perform(|person| person.rename("Bob")).await.unwrap();

    assert_eq!(person.version(), Some(AggregateRootVersion::new(1)));
    assert_eq!(person.instance().unwrap().name.as_deref(), Some("Bob"));
}

#[tokio::test]
async fn cancelled_operations_fetch_and_commit_nothing() {
    let (aggregates, store) = setup();
    let mut person = aggregates.get::<Person>("cancelled").unwrap();
    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let error = person
        .perform_with_cancellation(|person| person.rename("Bob"), &cancellation)
        .await
        .unwrap_err();

    assert!(matches!(
        error.source,
        OperationError::Rehydration(RehydrationError::Cancelled)
    ));
    assert_eq!(store.fetches(), 0);
    assert_eq!(store.commits(), 0);
    assert_eq!(person.state(), OperationState::Uninitialized);
}

#[tokio::test]
async fn cancelling_before_commit_discards_the_instance() {
    let (aggregates, store) = setup();
    let mut person = aggregates.get::<Person>("cancelled-late").unwrap();
    let cancellation = CancellationToken::new();
    let token = cancellation.clone();

    let error = person
        .perform_with_cancellation(
            move |person| {
                token.cancel();
                person.rename("Bob")
            },
            &cancellation,
        )
        .await
        .unwrap_err();

    assert!(matches!(error.source, OperationError::Commit(CommitError::Cancelled)));
    assert_eq!(store.fetches(), 1);
    assert_eq!(store.commits(), 0);
    assert!(person.instance().is_none());

    person.perform(|person| person.rename("Bob")).await.unwrap();

    assert_eq!(store.fetches(), 2);
    assert_eq!(person.version(), Some(AggregateRootVersion::new(1)));
}

#[tokio::test]
async fn cancelling_between_batches_stops_rehydration() {
    let (aggregates, store) = setup_with_store(InMemoryEventStore::new().with_batch_size(1));
    let event_source_id = EventSourceId::from("cancelled-midway");
    store
        .seed(COUNTER_ID, &event_source_id, vec![(incremented(), ()), (incremented(), ())])
        .await;
    store.cancel_at_batch(1);

    let mut counter = aggregates.get::<Counter>(event_source_id).unwrap();
    let error = counter
        .perform_with_cancellation(|counter| counter.increment(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        error.source,
        OperationError::Rehydration(RehydrationError::Cancelled)
    ));
    assert_eq!(store.fetches(), 1);
    assert_eq!(store.commits(), 0);
    assert!(counter.instance().is_none());
    assert_eq!(counter.state(), OperationState::Uninitialized);
}

#[tokio::test]
async fn unexpected_acknowledgements_discard_the_cached_instance() {
    let (aggregates, store) = setup();
    let mut person = aggregates.get::<Person>("misacknowledged").unwrap();
    store.tamper_next_acknowledgement();

    let error = person.perform(|person| person.rename("Alice")).await.unwrap_err();

    assert!(matches!(
        error.source,
        OperationError::Commit(CommitError::UnexpectedAcknowledgement { .. })
    ));
    assert!(person.instance().is_none());

    person.perform(|person| person.rename("Bob")).await.unwrap();

    assert_eq!(store.fetches(), 2);
    assert_eq!(store.committed()[1].expected_aggregate_root_version, AggregateRootVersion::new(1));
    assert_eq!(person.version(), Some(AggregateRootVersion::new(2)));
    assert_eq!(person.instance().unwrap().name.as_deref(), Some("Bob"));
}

#[tokio::test]
async fn failing_constructors_fail_the_operation() {
    let (aggregates, store) = setup();
    let mut broken = aggregates.get::<Broken>("broken").unwrap();

    let error = broken.perform(|_| Ok::<_, TestError>(())).await.unwrap_err();

    match &error.source {
        OperationError::Construction(ConstructionError::Failed { source, .. }) => {
            assert!(matches!(source.downcast_ref::<TestError>(), Some(TestError::Refused)))
        }
        other => panic!("expected the constructor to fail, got {:?}", other),
    }
    assert_eq!(store.fetches(), 0);
    assert_eq!(broken.state(), OperationState::Uninitialized);
}

#[tokio::test]
async fn constructors_must_keep_the_event_source_id() {
    let (aggregates, store) = setup();
    let mut drifting = aggregates.get::<Drifting>("expected").unwrap();

    let error = drifting.perform(|_| Ok::<_, TestError>(())).await.unwrap_err();

    match &error.source {
        OperationError::Construction(ConstructionError::EventSourceIdMismatch { expected, actual, .. }) => {
            assert_eq!(expected, &EventSourceId::from("expected"));
            assert_eq!(actual.as_ref(), Some(&EventSourceId::from("elsewhere")));
        }
        other => panic!("expected an event source id mismatch, got {:?}", other),
    }
    assert_eq!(store.fetches(), 0);
}

#[tokio::test]
async fn unhandled_history_fails_rehydration() {
    let (aggregates, store) = setup();
    let event_source_id = EventSourceId::from("polluted");
    store
        .seed(PERSON_ID, &event_source_id, vec![(pinged(), Pinged { at: 1 })])
        .await;
    store.leak_event_types(vec![pinged()]);

    let mut person = aggregates.get::<Person>(event_source_id).unwrap();
    let error = person.perform(|person| person.rename("Bob")).await.unwrap_err();

    assert!(matches!(
        error.source,
        OperationError::Rehydration(RehydrationError::Replay {
            source: HandlerError::Missing { .. },
            ..
        })
    ));
    assert_eq!(store.commits(), 0);
}

#[tokio::test]
async fn aggregate_roots_without_type_cannot_be_operated_on() {
    let (aggregates, store) = setup();
    let mut nameless = aggregates.get::<Nameless>("nameless").unwrap();

    let error = nameless.perform(|_| Ok::<_, TestError>(())).await.unwrap_err();

    assert!(matches!(
        error.source,
        OperationError::Construction(ConstructionError::MissingAggregateRootType { .. })
    ));
    assert!(error.aggregate_root_type.is_none());
    assert_eq!(store.fetches(), 0);
}

#[tokio::test]
async fn rehydration_only_asks_for_handled_event_types() {
    let (aggregates, store) = setup();
    let event_source_id = EventSourceId::from("mixed");
    store
        .seed(
            PERSON_ID,
            &event_source_id,
            vec![
                (renamed(), json!({ "name": "Alice" })),
                (pinged(), json!({ "at": 1 })),
                (renamed(), json!({ "name": "Carol" })),
            ],
        )
        .await;

    let mut person = aggregates.get::<Person>(event_source_id).unwrap();
    person.perform(|_| Ok::<_, TestError>(())).await.unwrap();

    // Filtered events still count towards the version.
    assert_eq!(person.instance().unwrap().name.as_deref(), Some("Carol"));
    assert_eq!(person.version(), Some(AggregateRootVersion::new(3)));
}
