//! Activation policies deciding whether a request is profiled.
//!
//! A request is profiled only when both the global peek toggle and the
//! query-specific toggle agree. The query toggle defaults to the global one,
//! so most policies only implement [`ActivationPolicy::peek_enabled`].

use http::{HeaderMap, Method, Request, Uri};

use crate::config::ActivationConfig;

/// Borrowed view of the request being considered for profiling.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestContext<'a> {
    pub fn new(method: &'a Method, uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        Self::new(request.method(), request.uri(), request.headers())
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Header value as a string, if present and valid ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Decides per request whether query profiling runs.
///
/// Implementations must be side-effect free; the profiler evaluates
/// [`is_active`](ActivationPolicy::is_active) exactly once per unit of work.
pub trait ActivationPolicy: Send + Sync {
    /// Global toggle for the profiling overlay.
    fn peek_enabled(&self, ctx: &RequestContext<'_>) -> bool;

    /// Query-tracking toggle; override to disable query tracking separately.
    fn queries_enabled(&self, ctx: &RequestContext<'_>) -> bool {
        self.peek_enabled(ctx)
    }

    /// Both toggles combined.
    fn is_active(&self, ctx: &RequestContext<'_>) -> bool {
        self.peek_enabled(ctx) && self.queries_enabled(ctx)
    }
}

impl<F> ActivationPolicy for F
where
    F: Fn(&RequestContext<'_>) -> bool + Send + Sync,
{
    fn peek_enabled(&self, ctx: &RequestContext<'_>) -> bool {
        self(ctx)
    }
}

/// Policy with a fixed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPolicy {
    enabled: bool,
}

impl StaticPolicy {
    pub const fn always() -> Self {
        Self { enabled: true }
    }

    pub const fn never() -> Self {
        Self { enabled: false }
    }
}

impl ActivationPolicy for StaticPolicy {
    #[inline]
    fn peek_enabled(&self, _ctx: &RequestContext<'_>) -> bool {
        self.enabled
    }
}

/// Policy driven by [`ActivationConfig`].
///
/// - `enabled` turns profiling on for every request
/// - `toggle_header` lets individual requests opt in (`1`, `true`, `on`)
/// - `queries_enabled` overrides the query toggle when set
#[derive(Debug, Clone)]
pub struct ConfigPolicy {
    config: ActivationConfig,
}

impl ConfigPolicy {
    pub fn new(config: ActivationConfig) -> Self {
        Self { config }
    }

    fn header_opt_in(&self, ctx: &RequestContext<'_>) -> bool {
        let Some(name) = self.config.toggle_header.as_deref() else {
            return false;
        };
        ctx.header(name).is_some_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            )
        })
    }
}

impl ActivationPolicy for ConfigPolicy {
    fn peek_enabled(&self, ctx: &RequestContext<'_>) -> bool {
        self.config.enabled || self.header_opt_in(ctx)
    }

    fn queries_enabled(&self, ctx: &RequestContext<'_>) -> bool {
        match self.config.queries_enabled {
            Some(enabled) => enabled,
            None => self.peek_enabled(ctx),
        }
    }
}
