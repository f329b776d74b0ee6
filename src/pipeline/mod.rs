//! Background consume, persist, broadcast loop.
//!
//! ## Lifecycle
//! ```text
//! NotStarted --start()--> Running --stop()--> Stopping --> Stopped
//! ```
//!
//! The loop draws one event at a time from the session's [`EventStream`],
//! appends it to the [`EventStore`] and hands the stored record to the
//! [`Broadcaster`]. A failure on one event is logged and the event dropped;
//! the loop moves on to the next one.
//!
//! Cancellation is checked only while waiting for the next message, so an
//! event that has been read is always processed to completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{BrokerSession, BusError, EventStream};
use crate::event::{IncomingEvent, SharedEvent};
use crate::handlers::fanout::{BroadcastError, Broadcaster};
use crate::storage::{EventStore, StorageError};

/// Default bound on how long `stop` waits for the loop to exit.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Errors raised by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Broker error: {0}")]
    Bus(#[from] BusError),

    #[error("Failed to persist event: {0}")]
    Persist(#[from] StorageError),

    #[error("Failed to broadcast event: {0}")]
    Broadcast(#[from] BroadcastError),
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::NotStarted => "not_started",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters updated by the loop.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
    broadcast_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub persisted: u64,
    pub persist_failures: u64,
    pub broadcast_failures: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            broadcast_failures: self.broadcast_failures.load(Ordering::Relaxed),
        }
    }
}

/// Persists and broadcasts a single event.
#[derive(Clone)]
pub struct EventProcessor {
    store: Arc<dyn EventStore>,
    broadcaster: Arc<dyn Broadcaster>,
    stats: Arc<PipelineStats>,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn EventStore>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            store,
            broadcaster,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Persist, then broadcast. Nothing is retried.
    pub async fn process(&self, event: IncomingEvent) -> Result<SharedEvent, PipelineError> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let stored = match self.store.append(&event.event_type, &event.payload).await {
            Ok(stored) => Arc::new(stored),
            Err(e) => {
                self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };
        self.stats.persisted.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.broadcaster.broadcast(Arc::clone(&stored)).await {
            self.stats.broadcast_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }

        Ok(stored)
    }
}

enum State {
    NotStarted,
    Running {
        token: CancellationToken,
        handle: JoinHandle<EventStream>,
    },
    Stopping,
    Stopped,
}

/// Owns the background loop and its lifecycle.
pub struct PipelineCoordinator {
    session: Arc<BrokerSession>,
    processor: EventProcessor,
    grace: Duration,
    state: Mutex<State>,
}

impl PipelineCoordinator {
    pub fn new(
        session: Arc<BrokerSession>,
        store: Arc<dyn EventStore>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            session,
            processor: EventProcessor::new(store, broadcaster),
            grace: DEFAULT_SHUTDOWN_GRACE,
            state: Mutex::new(State::NotStarted),
        }
    }

    /// Bound on how long `stop` waits for the loop before abandoning it.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> PipelineState {
        match *self.lock_state() {
            State::NotStarted => PipelineState::NotStarted,
            State::Running { .. } => PipelineState::Running,
            State::Stopping => PipelineState::Stopping,
            State::Stopped => PipelineState::Stopped,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.processor.stats()
    }

    /// Launch the loop on its own task.
    ///
    /// The session must be started. Calling `start` while running is a no-op.
    pub async fn start(&self) -> Result<(), PipelineError> {
        if matches!(
            self.state(),
            PipelineState::Running | PipelineState::Stopping
        ) {
            debug!("Pipeline already running");
            return Ok(());
        }

        let stream = self.session.subscribe_stream().await?;
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            stream,
            token.clone(),
            self.processor.clone(),
        ));

        *self.lock_state() = State::Running { token, handle };
        info!(topic = %self.session.topic(), "Pipeline started");
        Ok(())
    }

    /// Cancel the loop and wait for it to exit, up to the shutdown grace.
    ///
    /// The subscription is handed back to the session so stopping the session
    /// closes it. If the loop overruns the grace period it is aborted and the
    /// session opens a replacement subscription, so `start` works again.
    /// No-op unless running.
    pub async fn stop(&self) {
        let (token, mut handle) = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, State::Stopping) {
                State::Running { token, handle } => (token, handle),
                other => {
                    *state = other;
                    return;
                }
            }
        };

        info!("Stopping pipeline");
        token.cancel();

        match tokio::time::timeout(self.grace, &mut handle).await {
            Ok(Ok(stream)) => {
                self.session.restore_subscription(stream).await;
                info!("Pipeline stopped");
            }
            Ok(Err(e)) => {
                error!(error = %e, "Pipeline task failed");
                self.reopen_subscription().await;
            }
            Err(_) => {
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "Pipeline did not stop within grace period, aborting"
                );
                handle.abort();
                // Wait for the abort so the lost stream is dropped before its
                // replacement joins the group.
                let _ = handle.await;
                self.reopen_subscription().await;
            }
        }

        *self.lock_state() = State::Stopped;
    }

    /// The loop's stream was lost with its task; give the session a new one
    /// so the pipeline can be started again.
    async fn reopen_subscription(&self) {
        if let Err(e) = self.session.reset_subscription().await {
            error!(error = %e, "Failed to reopen subscription");
        }
    }
}

async fn run_loop(
    mut stream: EventStream,
    token: CancellationToken,
    processor: EventProcessor,
) -> EventStream {
    info!(topic = %stream.topic(), "Starting consume loop");

    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Consume loop cancelled");
                break;
            }
            next = stream.next() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let event_type = event.event_type.clone();
        match processor.process(event).await {
            Ok(stored) => {
                debug!(
                    event_id = %stored.id,
                    event_type = %stored.event_type,
                    "Event persisted and broadcast"
                );
            }
            Err(e) => {
                error!(event_type = %event_type, error = %e, "Failed processing event");
            }
        }
    }

    info!(topic = %stream.topic(), "Consume loop exited");
    stream
}
