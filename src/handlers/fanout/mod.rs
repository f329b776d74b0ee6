//! Live fan-out of persisted events to connected subscribers.
//!
//! Best effort: each subscriber has a small bounded queue. A subscriber whose
//! queue is full misses the event; a subscriber that disconnected is dropped
//! from the registry. Subscribers only see events broadcast after they joined.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::event::SharedEvent;

/// Queue depth per subscriber.
const SUBSCRIBER_CAPACITY: usize = 64;

/// Errors from a broadcast sink.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Broadcast sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for newly persisted events.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver an event to every currently connected subscriber.
    ///
    /// Returns the number of subscribers reached.
    async fn broadcast(&self, event: SharedEvent) -> Result<usize, BroadcastError>;
}

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<SharedEvent>,
}

/// In-process fan-out to live subscribers.
pub struct LiveFanout {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl LiveFanout {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber.
    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);

        let count = {
            let mut subs = self.subscribers.write().await;
            subs.push(Subscriber { id, sender: tx });
            subs.len()
        };
        debug!(subscriber = id, subscribers = count, "Subscriber connected");

        Subscription {
            id,
            inner: ReceiverStream::new(rx),
        }
    }

    /// Number of registered subscribers, including ones that disconnected
    /// since the last broadcast.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for LiveFanout {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for LiveFanout {
    async fn broadcast(&self, event: SharedEvent) -> Result<usize, BroadcastError> {
        let mut subs = self.subscribers.write().await;
        let mut sent = 0;

        subs.retain(|sub| {
            match sub.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {
                    sent += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber = sub.id,
                        event_id = %event.id,
                        "Subscriber queue full, event not delivered"
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(subscriber = sub.id, "Removing disconnected subscriber");
                    false
                }
            }
        });

        debug!(
            event_id = %event.id,
            sent = sent,
            remaining = subs.len(),
            "Event broadcast"
        );
        Ok(sent)
    }
}

/// Receiving side of a fan-out subscription.
pub struct Subscription {
    id: u64,
    inner: ReceiverStream<SharedEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. `None` once the fan-out is dropped.
    ///
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<SharedEvent> {
        self.inner.next().await
    }
}

impl Stream for Subscription {
    type Item = SharedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
