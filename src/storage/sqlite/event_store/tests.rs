use super::*;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;

use crate::storage::StorageError;

async fn store() -> SqliteEventStore {
    // One connection: every connection to `sqlite::memory:` is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteEventStore::new(pool);
    store.init().await.unwrap();
    store
}

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let store = store().await;
    store.init().await.unwrap();
}

#[tokio::test]
async fn test_append_assigns_identity_and_round_trips() {
    let store = store().await;
    let stored = store
        .append("demo.test", &payload(json!({"hello": "world", "n": [1, 2]})))
        .await
        .unwrap();

    let listed = store.list_recent(10).await.unwrap();
    assert_eq!(listed, vec![stored.clone()]);
    assert_eq!(stored.payload["hello"], json!("world"));
}

#[tokio::test]
async fn test_ids_are_unique() {
    let store = store().await;
    let a = store.append("t", &Payload::new()).await.unwrap();
    let b = store.append("t", &Payload::new()).await.unwrap();
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn test_list_recent_is_most_recent_first() {
    let store = store().await;
    let mut appended = Vec::new();
    for i in 0..5 {
        appended.push(store.append("seq", &payload(json!({"i": i}))).await.unwrap());
    }

    let listed = store.list_recent(3).await.unwrap();
    let expected: Vec<_> = appended.iter().rev().take(3).cloned().collect();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn test_list_recent_zero_limit_is_empty() {
    let store = store().await;
    store.append("t", &Payload::new()).await.unwrap();
    assert!(store.list_recent(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_append_rejects_invalid_event_type() {
    let store = store().await;
    let result = store.append("", &Payload::new()).await;
    assert!(matches!(result, Err(StorageError::InvalidEventType(_))));
    assert!(store.list_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_row_surfaces_error() {
    let store = store().await;
    sqlx::query(
        "INSERT INTO events (id, event_type, payload, created_at) VALUES ('not-a-uuid', 't', '{}', '2026-01-01T00:00:00.000000Z')",
    )
    .execute(store.pool())
    .await
    .unwrap();

    assert!(matches!(
        store.list_recent(10).await,
        Err(StorageError::InvalidUuid(_))
    ));
}
