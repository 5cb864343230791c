//! Notification payloads published by database drivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default event name for executed SQL statements.
pub const SQL_EVENT: &str = "sql.query";

/// Statement name drivers use to flag a result served from the query cache.
pub const CACHE_STATEMENT_NAME: &str = "CACHE";

/// Driver-supplied metadata for one executed statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlPayload {
    /// Statement text as sent to the database
    pub sql: String,

    /// Optional statement label (e.g. "User Load", or "CACHE" for cache hits)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Explicit driver-level cache flag
    #[serde(default)]
    pub cached: bool,

    /// Connection that executed the statement, if the driver tracks it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<u64>,
}

impl SqlPayload {
    /// Create a payload for a statement.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    /// Set the statement label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark the statement as served from the driver cache.
    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }

    /// Set the connection id.
    pub fn with_connection_id(mut self, connection_id: u64) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    /// Whether this statement was answered from a driver-level cache.
    #[inline]
    pub fn is_cache_hit(&self) -> bool {
        self.cached || self.name.as_deref() == Some(CACHE_STATEMENT_NAME)
    }
}

/// One notification delivered to listeners.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Event name used for listener matching
    pub name: String,
    /// Wall-clock time the statement started
    pub started_at: DateTime<Utc>,
    /// Execution time in milliseconds
    pub duration_ms: f64,
    /// Statement metadata
    pub payload: SqlPayload,
}

impl Notification {
    /// Create a notification stamped with the current time.
    pub fn new(name: impl Into<String>, payload: SqlPayload, duration_ms: f64) -> Self {
        Self {
            name: name.into(),
            started_at: Utc::now(),
            duration_ms: duration_ms.max(0.0),
            payload,
        }
    }

    /// Create a [`SQL_EVENT`] notification.
    pub fn sql(payload: SqlPayload, duration_ms: f64) -> Self {
        Self::new(SQL_EVENT, payload, duration_ms)
    }

    /// Override the start timestamp.
    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }
}
