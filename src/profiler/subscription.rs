//! Listener registration bound to one unit of work.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use super::QueryEvent;
use crate::{
    notifications::{Notification, Notifier, ScopeId, SubscriptionId},
    observability::events::{Event, SubscriptionOpenedEvent, SubscriptionReleasedEvent},
};

/// A scoped listener and the buffer it fills.
///
/// The listener is removed by [`release`](Self::release), by
/// [`finish`](Self::finish), or when the guard is dropped, whichever comes
/// first. Later calls are no-ops, so every exit path of the unit of work
/// (return, error, panic, cancelled future) deregisters exactly once.
pub struct ScopedSubscription {
    notifier: Arc<Notifier>,
    id: SubscriptionId,
    scope: ScopeId,
    active: bool,
    buffer: Arc<Mutex<Vec<QueryEvent>>>,
}

impl ScopedSubscription {
    /// Register a listener for `event_name` notifications published in `scope`.
    pub fn open(notifier: Arc<Notifier>, event_name: &str, scope: ScopeId) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let id = notifier.subscribe_scoped(event_name, scope, move |notification: &Notification| {
            let mut events = sink.lock();
            let sequence = events.len();
            events.push(QueryEvent::record(sequence, notification));
        });

        SubscriptionOpenedEvent {
            scope,
            subscription: id,
        }
        .emit();

        Self {
            notifier,
            id,
            scope,
            active: true,
            buffer,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of statements collected so far.
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deregister the listener. Safe to call more than once.
    pub fn release(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        self.notifier.unsubscribe(self.id);
        SubscriptionReleasedEvent {
            scope: self.scope,
            subscription: self.id,
            collected: self.len(),
        }
        .emit();
    }

    /// Deregister and hand over the collected statements.
    pub fn finish(mut self) -> Vec<QueryEvent> {
        self.release();
        let events = std::mem::take(&mut *self.buffer.lock());
        events
    }
}

impl Drop for ScopedSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ScopedSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedSubscription")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("active", &self.active)
            .field("collected", &self.len())
            .finish()
    }
}
