use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::notifications::Notification;

/// One observed statement execution.
///
/// Immutable once recorded; `sequence` is its position in the buffer of the
/// unit of work that collected it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryEvent {
    sequence: usize,
    sql: String,
    duration_ms: f64,
    cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    started_at: DateTime<Utc>,
}

impl QueryEvent {
    /// Record a notification at position `sequence`.
    pub fn record(sequence: usize, notification: &Notification) -> Self {
        Self {
            sequence,
            sql: notification.payload.sql.clone(),
            duration_ms: notification.duration_ms,
            cached: notification.payload.is_cache_hit(),
            name: notification.payload.name.clone(),
            started_at: notification.started_at,
        }
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
