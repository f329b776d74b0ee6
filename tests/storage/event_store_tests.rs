//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests. They share one store,
//! so every test uses its own event types and only looks at the newest rows.

use serde_json::{json, Map, Value};

use eventpipe::event::Payload;
use eventpipe::storage::{EventStore, StorageError, MAX_LIST_LIMIT};

/// Build a payload from a JSON object literal.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

// =============================================================================
// EventStore::append tests
// =============================================================================

pub async fn test_append_assigns_identity<S: EventStore>(store: &S) {
    let first = store
        .append("test_identity", &payload(json!({"hello": "world"})))
        .await
        .expect("append should succeed");
    let second = store
        .append("test_identity", &payload(json!({"hello": "world"})))
        .await
        .expect("append should succeed");

    assert_ne!(first.id, second.id, "each append gets a fresh id");
    assert_eq!(first.event_type, "test_identity");
    assert_eq!(first.payload["hello"], "world");
    assert!(second.created_at >= first.created_at);
}

pub async fn test_append_empty_payload<S: EventStore>(store: &S) {
    let stored = store
        .append("test_empty_payload", &Map::new())
        .await
        .expect("append should succeed");
    assert!(stored.payload.is_empty());

    let recent = store.list_recent(1).await.expect("list should succeed");
    assert_eq!(recent[0].id, stored.id);
    assert!(recent[0].payload.is_empty());
}

pub async fn test_append_rejects_invalid_event_type<S: EventStore>(store: &S) {
    let empty = store.append("", &Map::new()).await;
    assert!(matches!(empty, Err(StorageError::InvalidEventType(_))));

    let long = store.append(&"x".repeat(65), &Map::new()).await;
    assert!(matches!(long, Err(StorageError::InvalidEventType(_))));

    let max = store
        .append(&"y".repeat(64), &Map::new())
        .await
        .expect("64 characters should fit");
    assert_eq!(max.event_type.len(), 64);
}

pub async fn test_payload_round_trips_nested_values<S: EventStore>(store: &S) {
    let original = payload(json!({
        "readings": [1, 2.5, null, "x"],
        "meta": {"ok": true, "depth": {"level": 3}},
        "unicode": "héllo ✓"
    }));
    let stored = store
        .append("test_nested", &original)
        .await
        .expect("append should succeed");

    let recent = store.list_recent(1).await.expect("list should succeed");
    assert_eq!(recent[0].id, stored.id);
    assert_eq!(recent[0].payload, original);
    assert_eq!(recent[0].created_at, stored.created_at);
}

// =============================================================================
// EventStore::list_recent tests
// =============================================================================

pub async fn test_list_recent_most_recent_first<S: EventStore>(store: &S) {
    let mut ids = Vec::new();
    for n in 0..3 {
        let stored = store
            .append("test_order", &payload(json!({"n": n})))
            .await
            .expect("append should succeed");
        ids.push(stored.id);
    }

    let recent = store.list_recent(3).await.expect("list should succeed");
    let listed: Vec<_> = recent.iter().map(|e| e.id).collect();
    ids.reverse();
    assert_eq!(listed, ids, "newest first, ties broken by insertion order");
    assert!(recent
        .windows(2)
        .all(|w| w[0].created_at >= w[1].created_at));
}

pub async fn test_list_recent_zero_limit<S: EventStore>(store: &S) {
    store
        .append("test_zero_limit", &Map::new())
        .await
        .expect("append should succeed");

    let recent = store.list_recent(0).await.expect("list should succeed");
    assert!(recent.is_empty());
}

pub async fn test_list_recent_caps_limit<S: EventStore>(store: &S) {
    for n in 0..MAX_LIST_LIMIT + 5 {
        store
            .append("test_cap", &payload(json!({"n": n})))
            .await
            .expect("append should succeed");
    }

    let recent = store
        .list_recent(MAX_LIST_LIMIT * 10)
        .await
        .expect("list should succeed");
    assert_eq!(recent.len(), MAX_LIST_LIMIT);
    assert_eq!(recent[0].payload["n"], MAX_LIST_LIMIT + 4);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all EventStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr) => {
        use $crate::storage::event_store_tests::*;

        // append tests
        test_append_assigns_identity($store).await;
        println!("  test_append_assigns_identity: PASSED");

        test_append_empty_payload($store).await;
        println!("  test_append_empty_payload: PASSED");

        test_append_rejects_invalid_event_type($store).await;
        println!("  test_append_rejects_invalid_event_type: PASSED");

        test_payload_round_trips_nested_values($store).await;
        println!("  test_payload_round_trips_nested_values: PASSED");

        // list_recent tests
        test_list_recent_most_recent_first($store).await;
        println!("  test_list_recent_most_recent_first: PASSED");

        test_list_recent_zero_limit($store).await;
        println!("  test_list_recent_zero_limit: PASSED");

        test_list_recent_caps_limit($store).await;
        println!("  test_list_recent_caps_limit: PASSED");
    };
}
