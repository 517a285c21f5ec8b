use boost_core::paths::CollectionPath;
use boost_storage::{
    BlobStore, CollectionQuery, DocumentStore, Fields, MemoryStore, MonotonicClock, Operation,
    StoreError, StoreEvent,
};
use serde_json::json;
use std::sync::mpsc::{Receiver, channel};

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().expect("object literal")
}

fn next_ids(rx: &Receiver<StoreEvent>) -> Vec<String> {
    match rx.try_recv().expect("snapshot expected") {
        StoreEvent::Snapshot(event) => event
            .result
            .expect("snapshot ok")
            .into_iter()
            .map(|doc| doc.id)
            .collect(),
        other => panic!("expected snapshot, got {other:?}"),
    }
}

#[test]
fn subscription_gets_initial_and_per_write_snapshots() {
    let store = MemoryStore::with_clock(MonotonicClock::starting_at(1_000));
    let path = CollectionPath::new("users/u1/goals");
    let other = CollectionPath::new("users/u1/runs");
    let a = store.create_document(&path, Fields::new()).expect("create a");

    let (tx, rx) = channel();
    let _sub = store
        .subscribe_collection(CollectionQuery::newest_first(path.clone()), tx)
        .expect("subscribe");
    assert_eq!(next_ids(&rx), vec![a.clone()]);

    let b = store.create_document(&path, Fields::new()).expect("create b");
    assert_eq!(next_ids(&rx), vec![b.clone(), a.clone()]);

    store.create_document(&other, Fields::new()).expect("other path");
    assert!(rx.try_recv().is_err(), "writes elsewhere must not notify");

    store.delete_document(&path, &a).expect("delete");
    assert_eq!(next_ids(&rx), vec![b]);
}

#[test]
fn created_at_is_strictly_increasing() {
    let store = MemoryStore::with_clock(MonotonicClock::starting_at(42));
    let path = CollectionPath::new("events");
    for _ in 0..3 {
        store.create_document(&path, Fields::new()).expect("create");
    }
    let stamps: Vec<i64> = store
        .documents(&path)
        .iter()
        .map(|doc| doc.created_at_ms)
        .collect();
    assert_eq!(stamps, vec![42, 43, 44]);
}

#[test]
fn injected_failures_are_consumed_in_order() {
    let store = MemoryStore::new();
    let path = CollectionPath::new("users/u1/goals");
    store.fail_next(Operation::Create, 1);

    match store.create_document(&path, Fields::new()) {
        Err(StoreError::Unavailable(_)) => {}
        other => panic!("expected Unavailable, got {other:?}"),
    }
    store
        .create_document(&path, Fields::new())
        .expect("second create succeeds");
    assert_eq!(store.write_count(), 1);
}

#[test]
fn denied_prefix_rejects_reads_and_writes() {
    let store = MemoryStore::new();
    store.deny_prefix("users/u2/");
    let path = CollectionPath::new("users/u2/goals");
    let (tx, _rx) = channel();

    match store.subscribe_collection(CollectionQuery::newest_first(path.clone()), tx) {
        Err(StoreError::PermissionDenied { path }) => assert_eq!(path, "users/u2/goals"),
        other => panic!("expected PermissionDenied, got {other:?}"),
    }
    assert!(store.create_document(&path, Fields::new()).is_err());

    store.allow_all();
    store.create_document(&path, Fields::new()).expect("allowed again");
}

#[test]
fn broken_subscription_delivers_error_snapshot() {
    let store = MemoryStore::new();
    let path = CollectionPath::new("users/u1/goals");
    let (tx, rx) = channel();
    let sub = store
        .subscribe_collection(CollectionQuery::newest_first(path.clone()), tx)
        .expect("subscribe");
    let _ = rx.try_recv();

    store.break_subscriptions(&path, "revoked");
    match rx.try_recv().expect("error snapshot") {
        StoreEvent::Snapshot(event) => {
            assert_eq!(event.subscription, sub.id());
            assert!(event.result.is_err());
        }
        other => panic!("expected snapshot, got {other:?}"),
    }

    sub.close();
    assert_eq!(store.live_subscriptions(), 0);
}

#[test]
fn update_merges_fields() {
    let store = MemoryStore::new();
    let path = CollectionPath::new("users/u1/goals");
    let id = store
        .create_document(&path, fields(json!({"type": "field", "data": {"message": "x"}})))
        .expect("create");
    store
        .update_document(&path, &id, fields(json!({"data": {"message": "y"}})))
        .expect("update");
    let doc = &store.documents(&path)[0];
    assert_eq!(doc.fields.get("type"), Some(&json!("field")));
    assert_eq!(doc.fields.get("data"), Some(&json!({"message": "y"})));
}

#[test]
fn blobs_round_trip_and_delete() {
    let store = MemoryStore::new();
    let url = store
        .upload_blob("users/u1/goals/n1/a.png", &[1, 2, 3])
        .expect("upload");
    assert!(url.starts_with("mem://users/u1/goals/n1/a.png?sha256="));
    assert_eq!(store.blob("users/u1/goals/n1/a.png"), Some(vec![1, 2, 3]));

    store.delete_blob("users/u1/goals/n1/a.png").expect("delete");
    match store.delete_blob("users/u1/goals/n1/a.png") {
        Err(err) => assert!(err.is_not_found()),
        Ok(()) => panic!("second delete must fail"),
    }
}
