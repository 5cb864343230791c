//! Per-request SQL query profiler.
//!
//! Database code publishes a [`Notification`] for every executed statement.
//! The [`Profiler`] subscribes for the lifetime of one unit of work, collects
//! the statements issued inside it, and appends a report table to the HTML
//! response. [`query_peek_middleware`] does this for axum routers.

pub mod activation;
pub mod config;
pub mod middleware;
pub mod notifications;
pub mod observability;
pub mod profiler;
pub mod report;

pub use activation::{ActivationPolicy, ConfigPolicy, RequestContext, StaticPolicy};
pub use config::{ActivationConfig, ConfigError, PeekConfig};
pub use middleware::{query_peek_middleware, CapturedResponse, PeekState};
pub use notifications::{Notification, Notifier, ScopeId, SqlPayload, SubscriptionId};
pub use profiler::{Profiler, QueryEvent, ScopedSubscription};
pub use report::{
    RenderError, RenderOutcome, Report, ReportRenderer, ResponseSink, StatementFormatter,
    TextResponse,
};
