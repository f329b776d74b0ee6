//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Events table schema.
#[derive(Iden)]
pub enum Events {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "event_type"]
    EventType,
    #[iden = "payload"]
    Payload,
    #[iden = "created_at"]
    CreatedAt,
}

/// SQLite DDL for the events table.
///
/// `created_at` holds fixed-width RFC 3339 UTC text, so text order is time order.
pub const CREATE_EVENTS_TABLE_SQLITE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY NOT NULL,
    event_type VARCHAR(64) NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_event_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);
"#;

/// PostgreSQL DDL for the events table.
pub const CREATE_EVENTS_TABLE_POSTGRES: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id UUID PRIMARY KEY,
    event_type VARCHAR(64) NOT NULL,
    payload TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_event_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);
"#;
