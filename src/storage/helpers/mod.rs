//! Shared storage helper functions.
//!
//! Timestamp assignment and formatting, limit clamping and input checks
//! used across storage backend implementations.

use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

use super::{Result, StorageError, MAX_LIST_LIMIT};
use crate::event::MAX_EVENT_TYPE_LEN;

/// Hands out strictly increasing `created_at` values.
///
/// If the wall clock stalls or steps back, the previous timestamp plus one
/// microsecond is used, so insertion order and timestamp order agree.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time, truncated to microseconds, later than the last value.
    pub fn now(&self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    fn observe(&self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        let candidate = truncate_micros(candidate);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            Some(prev) if prev >= candidate => prev + TimeDelta::microseconds(1),
            _ => candidate,
        };
        *last = Some(next);
        next
    }
}

/// Drop sub-microsecond precision so stored and returned values compare equal.
fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// Fixed-width RFC 3339 text (`2026-01-02T03:04:05.123456Z`).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`format_timestamp`].
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{}: {}", text, e)))
}

/// Cap a requested limit at [`MAX_LIST_LIMIT`].
pub fn clamp_limit(limit: usize) -> usize {
    limit.min(MAX_LIST_LIMIT)
}

/// Event types must be non-empty and fit the schema column.
pub fn validate_event_type(event_type: &str) -> Result<()> {
    if event_type.is_empty() {
        return Err(StorageError::InvalidEventType("empty".to_string()));
    }
    if event_type.chars().count() > MAX_EVENT_TYPE_LEN {
        return Err(StorageError::InvalidEventType(format!(
            "longer than {} characters",
            MAX_EVENT_TYPE_LEN
        )));
    }
    Ok(())
}

/// Split a DDL script into individual statements.
pub fn statements(script: &str) -> impl Iterator<Item = &str> {
    script.split(';').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests;
