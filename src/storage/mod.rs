//! Event storage.
//!
//! This module contains:
//! - `EventStore` trait: append-only persistence with recency reads
//! - Implementations: SQLite, PostgreSQL, in-memory mock
//! - `init_storage`: backend selection from configuration

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::event::{Payload, StoredEvent};

pub mod helpers;
pub mod mock;
pub mod schema;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mock::MockEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEventStore;

/// Default number of events returned by recency reads.
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Upper bound on a single recency read.
pub const MAX_LIST_LIMIT: usize = 500;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Interface for event persistence.
///
/// Records are written once and never updated or deleted.
///
/// Implementations:
/// - `SqliteEventStore`: SQLite storage
/// - `PostgresEventStore`: PostgreSQL storage
/// - `MockEventStore`: In-memory mock for testing
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event, assigning a fresh id and the current time.
    ///
    /// `created_at` increases across successive appends to one store.
    async fn append(&self, event_type: &str, payload: &Payload) -> Result<StoredEvent>;

    /// Up to `limit` events, most recent first. `limit` is capped at
    /// [`MAX_LIST_LIMIT`].
    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredEvent>>;
}

/// Initialize the event store based on configuration.
///
/// Creates the schema if it does not exist.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn EventStore>, Box<dyn std::error::Error + Send + Sync>> {
    info!(storage_type = ?config.storage_type, "Initializing event store");

    match config.storage_type {
        StorageType::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                if let Some(dir) = sqlite::database_dir(&config.url) {
                    std::fs::create_dir_all(&dir)?;
                }

                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.url)
                    .await?;

                let store = SqliteEventStore::new(pool);
                store.init().await?;
                Ok(Arc::new(store))
            }

            #[cfg(not(feature = "sqlite"))]
            {
                Err("SQLite storage requires the 'sqlite' feature. Rebuild with --features sqlite".into())
            }
        }
        StorageType::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.url)
                    .await?;

                let store = PostgresEventStore::new(pool);
                store.init().await?;
                Ok(Arc::new(store))
            }

            #[cfg(not(feature = "postgres"))]
            {
                Err("PostgreSQL storage requires the 'postgres' feature. Rebuild with --features postgres".into())
            }
        }
    }
}
