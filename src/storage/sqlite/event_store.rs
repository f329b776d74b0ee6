//! SQLite EventStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::event::{Payload, StoredEvent};
use crate::storage::helpers::{
    clamp_limit, format_timestamp, parse_timestamp, statements, validate_event_type,
    MonotonicClock,
};
use crate::storage::schema::{Events, CREATE_EVENTS_TABLE_SQLITE};
use crate::storage::{EventStore, Result};

/// SQLite implementation of EventStore.
pub struct SqliteEventStore {
    pool: SqlitePool,
    clock: MonotonicClock,
}

impl SqliteEventStore {
    /// Create a new SQLite event store.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            clock: MonotonicClock::new(),
        }
    }

    /// Create the events table and indexes if missing.
    pub async fn init(&self) -> Result<()> {
        for statement in statements(CREATE_EVENTS_TABLE_SQLITE) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode_row(row: &SqliteRow) -> Result<StoredEvent> {
        let id: String = row.try_get("id")?;
        let payload: String = row.try_get("payload")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(StoredEvent {
            id: Uuid::parse_str(&id)?,
            event_type: row.try_get("event_type")?,
            payload: serde_json::from_str(&payload)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
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
            .to_string(SqliteQueryBuilder);

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
            .order_by_expr(Expr::cust("rowid"), Order::Desc)
            .limit(limit as u64)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode_row).collect()
    }
}

#[cfg(test)]
mod tests;
