//! Queued writes, draining and crash recovery.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::{new_review, restaurant, session, Call, FakeService, FlakyStore};
use serde_json::json;
use tablecache_core::{
    Collection, DrainOutcome, DrainState, DurableStore, MemoryStore, NewReview, Resource,
    Session, Source, SyncError, UnavailableStore,
};

fn names(writes: &[serde_json::Value]) -> Vec<String> {
    writes
        .iter()
        .map(|w| w["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_empty_drain_makes_no_remote_calls() {
    let service = FakeService::new();
    let session = session(Arc::new(MemoryStore::new()), service.clone());

    let result = session.drain().await;
    assert!(result.is_complete());
    assert_eq!(result.sent, 0);
    assert!(result.affected.is_empty());
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_offline_submit_is_delivered_on_drain() {
    let service = FakeService::new();
    service.set_offline(true);
    let session = session(Arc::new(MemoryStore::new()), service.clone());

    let receipt = session.submit_write(new_review(7, "Ann")).unwrap();
    assert_eq!(receipt.pending, 1);

    let result = session.drain().await;
    assert!(matches!(result.outcome, DrainOutcome::NoProgress(SyncError::RemoteUnreachable(_))));
    assert_eq!(session.pending_writes().unwrap().len(), 1);

    service.set_offline(false);
    service.clear_calls();
    let result = session.drain().await;

    assert!(result.is_complete());
    assert_eq!(result.sent, 1);
    assert_eq!(result.remaining, 0);
    assert_eq!(result.affected, BTreeSet::from([7]));
    assert!(session.pending_writes().unwrap().is_empty());
    assert_eq!(names(&service.writes()), vec!["Ann"]);
    assert!(service.calls().contains(&Call::ReadByParent(Resource::Reviews, 7)));
}

#[tokio::test]
async fn test_read_your_write_after_drain() {
    let service = FakeService::new();
    let session = session(Arc::new(MemoryStore::new()), service.clone());

    // Warm the cache before the review exists
    assert!(session.fetch_children_of(7).await.unwrap().value.is_empty());

    session.submit_write(new_review(7, "Ann")).unwrap();
    assert!(session.drain().await.is_complete());

    let reviews = session.fetch_children_of(7).await.unwrap();
    assert_eq!(reviews.source, Source::Cached);
    assert_eq!(reviews.value.len(), 1);
    assert_eq!(reviews.value[0].name, "Ann");
    session.settle().await;
}

#[tokio::test]
async fn test_drain_sends_in_submission_order() {
    let service = FakeService::new();
    let session = session(Arc::new(MemoryStore::new()), service.clone());
    for name in ["first", "second", "third"] {
        session.submit_write(new_review(1, name)).unwrap();
    }

    let result = session.drain().await;
    assert_eq!(result.sent, 3);
    assert_eq!(names(&service.writes()), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_partial_failure_keeps_failed_entry_and_rest() {
    let service = FakeService::new();
    service.reject_write(2);
    let session = session(Arc::new(MemoryStore::new()), service.clone());
    session.submit_write(new_review(1, "a")).unwrap();
    session.submit_write(new_review(2, "b")).unwrap();
    session.submit_write(new_review(3, "c")).unwrap();

    let result = session.drain().await;

    match &result.outcome {
        DrainOutcome::Partial(SyncError::RemoteRejected { status, .. }) => assert_eq!(*status, 500),
        other => panic!("expected partial drain, got {:?}", other),
    }
    assert_eq!(result.sent, 1);
    assert_eq!(result.remaining, 2);
    assert_eq!(result.affected, BTreeSet::from([1]));

    let left: Vec<u64> = session
        .pending_writes()
        .unwrap()
        .iter()
        .map(|e| e.parent_id())
        .collect();
    assert_eq!(left, vec![2, 3]);

    let result = session.drain().await;
    assert!(result.is_complete());
    assert_eq!(names(&service.writes()), vec!["a", "b", "b", "c"]);
}

#[tokio::test]
async fn test_interrupted_drain_never_resends_confirmed_entry() {
    let service = FakeService::new();
    service.hold_write(2);
    let store = Arc::new(MemoryStore::new());
    let first = session(store.clone(), service.clone());
    first.submit_write(new_review(1, "a")).unwrap();
    first.submit_write(new_review(2, "b")).unwrap();
    first.submit_write(new_review(3, "c")).unwrap();

    // Entry two never answers; dropping the drain stands in for a crash
    let interrupted = tokio::time::timeout(Duration::from_millis(200), first.drain()).await;
    assert!(interrupted.is_err());
    drop(first);

    service.write_gate.open();
    let restarted = session(store, service.clone());
    let left: Vec<u64> = restarted
        .pending_writes()
        .unwrap()
        .iter()
        .map(|e| e.parent_id())
        .collect();
    assert_eq!(left, vec![2, 3]);

    assert!(restarted.drain().await.is_complete());
    let delivered = names(&service.writes());
    assert_eq!(delivered.iter().filter(|n| *n == "a").count(), 1);
    assert!(restarted.pending_writes().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_acknowledge_stops_drain() {
    let service = FakeService::new();
    let inner = Arc::new(MemoryStore::new());
    let store = FlakyStore::new(inner.clone());
    let session = session(store.clone(), service.clone());
    session.submit_write(new_review(1, "a")).unwrap();
    session.submit_write(new_review(2, "b")).unwrap();
    session.submit_write(new_review(3, "c")).unwrap();

    store.fail_outbox_after(1);
    let result = session.drain().await;

    assert!(matches!(result.outcome, DrainOutcome::Partial(SyncError::StoreUnavailable(_))));
    assert_eq!(result.sent, 2);
    assert_eq!(names(&service.writes()), vec!["a", "b"]);

    // After a restart with a healthy store, "a" stays delivered exactly once
    let restarted = common::session(inner, service.clone());
    assert!(restarted.drain().await.is_complete());
    let delivered = names(&service.writes());
    assert_eq!(delivered.iter().filter(|n| *n == "a").count(), 1);
    assert_eq!(delivered.last().map(String::as_str), Some("c"));
}

#[tokio::test]
async fn test_concurrent_drain_is_coalesced() {
    let service = FakeService::new();
    service.hold_write(1);
    let session = Arc::new(session(Arc::new(MemoryStore::new()), service.clone()));
    session.submit_write(new_review(1, "a")).unwrap();

    let background = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.drain().await })
    };
    let drainer = session.drainer();
    while drainer.state() != DrainState::Draining {
        tokio::task::yield_now().await;
    }

    let second = session.drain().await;
    assert!(matches!(second.outcome, DrainOutcome::Coalesced));

    service.write_gate.open();
    let first = background.await.unwrap();
    assert!(first.is_complete());
    assert_eq!(first.sent, 1);
    assert_eq!(service.writes().len(), 1);
    assert_eq!(drainer.state(), DrainState::Idle);
}

#[tokio::test]
async fn test_write_queued_during_drain_waits_for_next_drain() {
    let service = FakeService::new();
    service.hold_write(1);
    let session = Arc::new(session(Arc::new(MemoryStore::new()), service.clone()));
    session.submit_write(new_review(1, "early")).unwrap();

    let background = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.drain().await })
    };
    while session.drain_state() != DrainState::Draining {
        tokio::task::yield_now().await;
    }
    session.submit_write(new_review(2, "late")).unwrap();
    service.write_gate.open();

    let result = background.await.unwrap();
    assert_eq!(result.sent, 1);
    assert_eq!(result.remaining, 1);
    assert_eq!(session.pending_writes().unwrap()[0].parent_id(), 2);

    assert_eq!(session.drain().await.sent, 1);
    assert_eq!(names(&service.writes()), vec!["early", "late"]);
}

#[tokio::test]
async fn test_invalid_review_is_rejected_before_queueing() {
    let session = session(Arc::new(MemoryStore::new()), FakeService::new());

    let err = session
        .submit_write(NewReview {
            restaurant_id: 1,
            name: "Ann".to_string(),
            rating: 9,
            comments: String::new(),
        })
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidPayload(_)));

    let err = session.submit_write(new_review(1, "  ")).unwrap_err();
    assert!(matches!(err, SyncError::InvalidPayload(_)));
    assert!(session.pending_writes().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_without_store_fails_loudly() {
    let store = Arc::new(UnavailableStore::new("/unwritable".into(), "quota exceeded"));
    let session = session(store, FakeService::new());

    let err = session.submit_write(new_review(1, "Ann")).unwrap_err();
    assert!(matches!(err, SyncError::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_favorite_is_delivered_and_refreshes_restaurant() {
    let service = FakeService::with_restaurants(vec![restaurant(4, "Roberta's Pizza", "Italian", "Brooklyn")]);
    let session = session(Arc::new(MemoryStore::new()), service.clone());
    assert!(!session.fetch_entity(4).await.unwrap().value.is_favorite);
    session.settle().await;

    session.set_favorite(4, true).unwrap();
    let result = session.drain().await;
    assert!(result.is_complete());
    assert_eq!(result.affected, BTreeSet::from([4]));
    assert!(service.calls().contains(&Call::Update(
        Resource::Restaurants,
        4,
        vec![("is_favorite".to_string(), "true".to_string())]
    )));

    let fetched = session.fetch_entity(4).await.unwrap();
    assert_eq!(fetched.source, Source::Cached);
    assert!(fetched.value.is_favorite);
    session.settle().await;
}

#[tokio::test]
async fn test_send_exceeding_timeout_keeps_queue() {
    let service = FakeService::new();
    service.hold_write(1);
    let session = Session::new(
        Arc::new(MemoryStore::new()),
        service.clone(),
        Duration::from_millis(50),
    );
    session.submit_write(new_review(1, "a")).unwrap();
    session.submit_write(new_review(2, "b")).unwrap();

    let result = session.drain().await;

    match &result.outcome {
        DrainOutcome::NoProgress(SyncError::RemoteUnreachable(reason)) => {
            assert!(reason.contains("50ms"), "unexpected reason: {}", reason)
        }
        other => panic!("expected timed out drain, got {:?}", other),
    }
    assert_eq!(result.sent, 0);
    assert_eq!(result.remaining, 2);
    assert!(result.affected.is_empty());

    let left: Vec<u64> = session
        .pending_writes()
        .unwrap()
        .iter()
        .map(|e| e.parent_id())
        .collect();
    assert_eq!(left, vec![1, 2]);
    service.write_gate.open();
}

#[tokio::test]
async fn test_failed_cache_refresh_does_not_fail_drain() {
    let service = FakeService::new();
    let store = Arc::new(MemoryStore::new());
    let session = session(store.clone(), service.clone());
    assert!(session.fetch_children_of(7).await.unwrap().value.is_empty());
    let before = store.get(Collection::Reviews, "7").unwrap().unwrap();

    session.submit_write(new_review(7, "Ann")).unwrap();
    service.fail_reads(true);
    let result = session.drain().await;

    assert!(result.is_complete());
    assert_eq!(result.sent, 1);
    assert_eq!(result.affected, BTreeSet::from([7]));
    assert!(session.pending_writes().unwrap().is_empty());
    assert_eq!(names(&service.writes()), vec!["Ann"]);

    let after = store.get(Collection::Reviews, "7").unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.data, json!([]));
}

#[tokio::test]
async fn test_coalesced_drain_reports_queue_length() {
    let service = FakeService::new();
    service.hold_write(1);
    let session = Arc::new(session(Arc::new(MemoryStore::new()), service.clone()));
    session.submit_write(new_review(1, "a")).unwrap();
    session.submit_write(new_review(2, "b")).unwrap();

    let background = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.drain().await })
    };
    while session.drain_state() != DrainState::Draining {
        tokio::task::yield_now().await;
    }

    let second = session.drain().await;
    assert!(matches!(second.outcome, DrainOutcome::Coalesced));
    assert_eq!(second.remaining, 2);

    service.write_gate.open();
    assert_eq!(background.await.unwrap().sent, 2);
}
