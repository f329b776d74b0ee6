//! In-memory implementation of the event store for tests.

mod event_store;

pub use event_store::MockEventStore;
