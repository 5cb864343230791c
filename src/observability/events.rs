//! Profiler lifecycle events.
//!
//! # Performance Characteristics
//!
//! - **Zero heap allocations** in emit path (uses borrowed strings)
//! - **Single atomic load** per emit to pick the log level
//! - **Static dispatch** via trait
//!
//! # Usage
//!
//! ```ignore
//! SubscriptionReleasedEvent { scope, subscription, collected: 3 }.emit();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, event, warn, Level};

use crate::notifications::{ScopeId, SubscriptionId};

/// Target used for all profiler lifecycle events.
pub const EVENT_TARGET: &str = "query_peek::events";

static PROMOTE_EVENTS: AtomicBool = AtomicBool::new(false);

/// Log lifecycle events at INFO instead of DEBUG.
pub fn set_promoted(promoted: bool) {
    PROMOTE_EVENTS.store(promoted, Ordering::Relaxed);
}

#[inline]
pub fn is_promoted() -> bool {
    PROMOTE_EVENTS.load(Ordering::Relaxed)
}

/// Trait for emitting observability events.
pub trait Event {
    /// Emit this event to the configured logging backends.
    fn emit(&self);
}

macro_rules! lifecycle {
    ($($field:tt)*) => {
        if is_promoted() {
            event!(target: EVENT_TARGET, Level::INFO, $($field)*);
        } else {
            debug!(target: EVENT_TARGET, $($field)*);
        }
    };
}

/// Profiling skipped because the activation policy declined the request.
#[derive(Debug, Clone, Copy)]
pub struct ActivationSkippedEvent;

impl Event for ActivationSkippedEvent {
    #[inline]
    fn emit(&self) {
        tracing::trace!(target: EVENT_TARGET, "Query profiling not active for request");
    }
}

/// A scoped listener was registered for a unit of work.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionOpenedEvent {
    pub scope: ScopeId,
    pub subscription: SubscriptionId,
}

impl Event for SubscriptionOpenedEvent {
    #[inline]
    fn emit(&self) {
        lifecycle!(
            scope = self.scope.as_u64(),
            subscription = self.subscription.as_u64(),
            "Query subscription opened"
        );
    }
}

/// A scoped listener was removed.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionReleasedEvent {
    pub scope: ScopeId,
    pub subscription: SubscriptionId,
    pub collected: usize,
}

impl Event for SubscriptionReleasedEvent {
    #[inline]
    fn emit(&self) {
        lifecycle!(
            scope = self.scope.as_u64(),
            subscription = self.subscription.as_u64(),
            collected = self.collected,
            "Query subscription released"
        );
    }
}

/// A report was appended to an HTML response.
#[derive(Debug, Clone, Copy)]
pub struct ReportRenderedEvent {
    pub scope: ScopeId,
    pub queries: usize,
    pub cache_hits: usize,
    pub total_ms: f64,
}

impl Event for ReportRenderedEvent {
    #[inline]
    fn emit(&self) {
        lifecycle!(
            scope = self.scope.as_u64(),
            queries = self.queries,
            cache_hits = self.cache_hits,
            total_ms = self.total_ms,
            "Query report injected"
        );
    }
}

/// Collected queries were dropped without rendering.
#[derive(Debug, Clone, Copy)]
pub struct ReportDiscardedEvent<'a> {
    pub scope: ScopeId,
    pub queries: usize,
    pub reason: &'a str,
}

impl Event for ReportDiscardedEvent<'_> {
    #[inline]
    fn emit(&self) {
        lifecycle!(
            scope = self.scope.as_u64(),
            queries = self.queries,
            reason = %self.reason,
            "Query report discarded"
        );
    }
}

/// Rendering failed; the response is returned unchanged.
#[derive(Debug, Clone, Copy)]
pub struct RenderFailedEvent<'a> {
    pub scope: ScopeId,
    pub error: &'a dyn std::error::Error,
}

impl Event for RenderFailedEvent<'_> {
    #[inline]
    fn emit(&self) {
        warn!(
            target: EVENT_TARGET,
            scope = self.scope.as_u64(),
            error = %self.error,
            "Failed to render query report"
        );
    }
}
