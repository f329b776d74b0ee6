//! Mock EventStore implementation for testing.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::event::{Payload, StoredEvent};
use crate::storage::helpers::{clamp_limit, validate_event_type, MonotonicClock};
use crate::storage::{EventStore, Result, StorageError};

/// Mock event store that keeps events in memory.
#[derive(Default)]
pub struct MockEventStore {
    events: RwLock<Vec<StoredEvent>>,
    clock: MonotonicClock,
    fail_on_append: RwLock<bool>,
    fail_event_types: RwLock<HashSet<String>>,
    fail_on_list: RwLock<bool>,
}

impl MockEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    /// Fail appends for one event type only.
    pub async fn fail_event_type(&self, event_type: impl Into<String>) {
        self.fail_event_types.write().await.insert(event_type.into());
    }

    pub async fn set_fail_on_list(&self, fail: bool) {
        *self.fail_on_list.write().await = fail;
    }

    /// Events in insertion order.
    pub async fn events(&self) -> Vec<StoredEvent> {
        self.events.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn append(&self, event_type: &str, payload: &Payload) -> Result<StoredEvent> {
        validate_event_type(event_type)?;

        if *self.fail_on_append.read().await
            || self.fail_event_types.read().await.contains(event_type)
        {
            return Err(StorageError::Unavailable(format!(
                "mock append failure for '{}'",
                event_type
            )));
        }

        let stored = StoredEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            payload: payload.clone(),
            created_at: self.clock.now(),
        };
        self.events.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredEvent>> {
        if *self.fail_on_list.read().await {
            return Err(StorageError::Unavailable("mock list failure".to_string()));
        }
        let events = self.events.read().await;
        Ok(events
            .iter()
            .rev()
            .take(clamp_limit(limit))
            .cloned()
            .collect())
    }
}
