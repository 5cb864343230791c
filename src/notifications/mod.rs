//! Event source for executed SQL statements.
//!
//! Database drivers publish one [`Notification`] per executed statement
//! through a [`Notifier`]. Listeners are either process-wide or bound to a
//! [`ScopeId`]; a scoped listener only sees notifications published while its
//! scope is current, which keeps concurrent requests from reading each
//! other's statements.
//!
//! # Usage
//!
//! ```ignore
//! let rows = notifications::global().instrument(SqlPayload::new(sql), || conn.query(sql));
//! ```

pub mod payload;
pub mod scope;

use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, LazyLock,
    },
    time::Instant,
};

use chrono::Utc;
use dashmap::DashMap;
use tracing::trace;

pub use payload::{Notification, SqlPayload, CACHE_STATEMENT_NAME, SQL_EVENT};
pub use scope::{bind_current_scope, current_scope, enter_scope, enter_scope_sync, ScopeId};

/// Callback invoked for each matching notification.
pub type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

static GLOBAL: LazyLock<Arc<Notifier>> = LazyLock::new(|| Arc::new(Notifier::new()));

/// The process-wide notifier.
pub fn global() -> &'static Arc<Notifier> {
    &GLOBAL
}

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Listener {
    event_name: String,
    scope: Option<ScopeId>,
    handler: Handler,
}

impl Listener {
    #[inline]
    fn matches(&self, event_name: &str, current: Option<ScopeId>) -> bool {
        self.event_name == event_name
            && match self.scope {
                Some(scope) => current == Some(scope),
                None => true,
            }
    }
}

/// Registry of statement listeners.
pub struct Notifier {
    listeners: DashMap<SubscriptionId, Listener>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn register(&self, event_name: &str, scope: Option<ScopeId>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(
            id,
            Listener {
                event_name: event_name.to_string(),
                scope,
                handler,
            },
        );
        trace!(subscription = %id, event = event_name, ?scope, "Listener registered");
        id
    }

    /// Register a process-wide listener for `event_name`.
    pub fn subscribe<F>(&self, event_name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.register(event_name, None, Arc::new(handler))
    }

    /// Register a listener that only fires while `scope` is current.
    pub fn subscribe_scoped<F>(&self, event_name: &str, scope: ScopeId, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.register(event_name, Some(scope), Arc::new(handler))
    }

    /// Remove a listener.
    ///
    /// Returns `false` when the id was already removed; calling this twice is
    /// harmless.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        trace!(subscription = %id, removed, "Listener removed");
        removed
    }

    /// Whether `id` is still registered.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.listeners.contains_key(&id)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver a notification to every matching listener.
    ///
    /// Handlers are cloned out of the registry first and run without holding
    /// any shard guard, so a handler may itself subscribe or unsubscribe.
    pub fn publish(&self, notification: &Notification) {
        let current = current_scope();
        let handlers: Vec<Handler> = self
            .listeners
            .iter()
            .filter(|entry| entry.value().matches(&notification.name, current))
            .map(|entry| Arc::clone(&entry.value().handler))
            .collect();

        for handler in handlers {
            handler(notification);
        }
    }

    /// Time `f` and publish a [`SQL_EVENT`] notification for it.
    pub fn instrument<T>(&self, payload: SqlPayload, f: impl FnOnce() -> T) -> T {
        let started_at = Utc::now();
        let start = Instant::now();
        let out = f();
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.publish(&Notification::sql(payload, duration_ms).started_at(started_at));
        out
    }

    /// Async counterpart of [`Notifier::instrument`].
    pub async fn instrument_async<F: Future>(&self, payload: SqlPayload, fut: F) -> F::Output {
        let started_at = Utc::now();
        let start = Instant::now();
        let out = fut.await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.publish(&Notification::sql(payload, duration_ms).started_at(started_at));
        out
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
