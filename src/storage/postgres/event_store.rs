//! PostgreSQL EventStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::event::{Payload, StoredEvent};
use crate::storage::helpers::{
    clamp_limit, format_timestamp, statements, validate_event_type, MonotonicClock,
};
use crate::storage::schema::{Events, CREATE_EVENTS_TABLE_POSTGRES};
use crate::storage::{EventStore, Result};

/// PostgreSQL implementation of EventStore.
pub struct PostgresEventStore {
    pool: PgPool,
    clock: MonotonicClock,
}

impl PostgresEventStore {
    /// Create a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: MonotonicClock::new(),
        }
    }

    /// Create the events table and indexes if missing.
    pub async fn init(&self) -> Result<()> {
        for statement in statements(CREATE_EVENTS_TABLE_POSTGRES) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn decode_row(row: &PgRow) -> Result<StoredEvent> {
        let payload: String = row.try_get("payload")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        Ok(StoredEvent {
            id: row.try_get::<Uuid, _>("id")?,
            event_type: row.try_get("event_type")?,
            payload: serde_json::from_str(&payload)?,
            created_at,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, event_type: &str, payload: &Payload) -> Result<StoredEvent> {
        validate_event_type(event_type)?;

        let id = Uuid::new_v4();
        let payload_text = serde_json::to_string(payload)?;
        let created_at = self.clock.now();

        let query = Query::insert()
            .into_table(Events::Table)
            .columns([
                Events::Id,
                Events::EventType,
                Events::Payload,
                Events::CreatedAt,
            ])
            .values_panic([
                id.to_string().into(),
                event_type.into(),
                payload_text.into(),
                format_timestamp(&created_at).into(),
            ])
            .to_string(PostgresQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(StoredEvent {
            id,
            event_type: event_type.to_string(),
            payload: payload.clone(),
            created_at,
        })
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredEvent>> {
        let limit = clamp_limit(limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = Query::select()
            .columns([
                Events::Id,
                Events::EventType,
                Events::Payload,
                Events::CreatedAt,
            ])
            .from(Events::Table)
            .order_by(Events::CreatedAt, Order::Desc)
            .order_by(Events::Id, Order::Desc)
            .limit(limit as u64)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_row).collect()
    }
}
