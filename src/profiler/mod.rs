//! Scoped query profiling for a single unit of work.
//!
//! [`Profiler::run_instrumented`] wraps one request handler:
//!
//! 1. Evaluates the activation policy; when inactive the work runs untouched
//! 2. Opens a [`ScopedSubscription`] on the notifier before the work starts
//! 3. Runs the work with its [`ScopeId`] as the current scope
//! 4. Releases the subscription on every exit path
//! 5. On success, appends the report to the response; on failure, discards it
//!
//! Rendering faults (errors or panics) are logged and never replace the
//! work's own result.

mod event;
mod subscription;

use std::{
    any::Any,
    fmt,
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

pub use event::QueryEvent;
pub use subscription::ScopedSubscription;

use crate::{
    activation::{ActivationPolicy, ConfigPolicy, RequestContext},
    config::PeekConfig,
    notifications::{self, enter_scope, enter_scope_sync, Notifier, ScopeId, SQL_EVENT},
    observability::events::{
        ActivationSkippedEvent, Event, RenderFailedEvent, ReportDiscardedEvent,
        ReportRenderedEvent,
    },
    report::{RenderError, RenderOutcome, ReportRenderer, ResponseSink, StatementFormatter},
};

/// Runs units of work with query collection and report injection.
pub struct Profiler {
    notifier: Arc<Notifier>,
    policy: Arc<dyn ActivationPolicy>,
    renderer: ReportRenderer,
    event_name: String,
}

impl Profiler {
    /// Profiler on the global notifier with the probed formatter.
    pub fn new(policy: Arc<dyn ActivationPolicy>) -> Self {
        Self {
            notifier: Arc::clone(notifications::global()),
            policy,
            renderer: ReportRenderer::default(),
            event_name: SQL_EVENT.to_string(),
        }
    }

    /// Profiler configured from a [`PeekConfig`].
    pub fn from_config(config: &PeekConfig) -> Self {
        let formatter = if config.highlight {
            StatementFormatter::probe()
        } else {
            StatementFormatter::plain()
        };
        Self {
            notifier: Arc::clone(notifications::global()),
            policy: Arc::new(ConfigPolicy::new(config.activation.clone())),
            renderer: ReportRenderer::new(formatter).with_title(config.modal_title.clone()),
            event_name: config.event_name.clone(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_renderer(mut self, renderer: ReportRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = event_name.into();
        self
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn renderer(&self) -> &ReportRenderer {
        &self.renderer
    }

    /// Evaluate the activation policy for a request.
    pub fn is_enabled(&self, ctx: &RequestContext<'_>) -> bool {
        self.policy.is_active(ctx)
    }

    /// Profile `work` if the policy enables it for `ctx`.
    pub async fn run_instrumented<F, R, E>(&self, ctx: &RequestContext<'_>, work: F) -> Result<R, E>
    where
        F: Future<Output = Result<R, E>>,
        R: ResponseSink,
    {
        let enabled = self.is_enabled(ctx);
        self.run_if(enabled, work).await
    }

    /// Profile `work` when `enabled` is true, otherwise just await it.
    ///
    /// Use this when the activation decision has to be taken before the
    /// request is moved into `work`.
    pub async fn run_if<F, R, E>(&self, enabled: bool, work: F) -> Result<R, E>
    where
        F: Future<Output = Result<R, E>>,
        R: ResponseSink,
    {
        if !enabled {
            ActivationSkippedEvent.emit();
            return work.await;
        }

        let (scope, outcome, events) = self.collect(work).await;
        self.complete(scope, outcome, events)
    }

    /// Run `work` in a fresh scope and return its output with the statements
    /// it executed. Nothing is rendered.
    pub async fn collect<F: Future>(&self, work: F) -> (ScopeId, F::Output, Vec<QueryEvent>) {
        let scope = ScopeId::next();
        let subscription = ScopedSubscription::open(Arc::clone(&self.notifier), &self.event_name, scope);
        let output = enter_scope(scope, work).await;
        (scope, output, subscription.finish())
    }

    /// Blocking counterpart of [`Profiler::run_instrumented`].
    pub fn run_instrumented_blocking<W, R, E>(&self, ctx: &RequestContext<'_>, work: W) -> Result<R, E>
    where
        W: FnOnce() -> Result<R, E>,
        R: ResponseSink,
    {
        let enabled = self.is_enabled(ctx);
        self.run_if_blocking(enabled, work)
    }

    /// Blocking counterpart of [`Profiler::run_if`].
    pub fn run_if_blocking<W, R, E>(&self, enabled: bool, work: W) -> Result<R, E>
    where
        W: FnOnce() -> Result<R, E>,
        R: ResponseSink,
    {
        if !enabled {
            ActivationSkippedEvent.emit();
            return work();
        }

        let (scope, outcome, events) = self.collect_blocking(work);
        self.complete(scope, outcome, events)
    }

    /// Blocking counterpart of [`Profiler::collect`].
    pub fn collect_blocking<W, T>(&self, work: W) -> (ScopeId, T, Vec<QueryEvent>)
    where
        W: FnOnce() -> T,
    {
        let scope = ScopeId::next();
        let subscription = ScopedSubscription::open(Arc::clone(&self.notifier), &self.event_name, scope);
        let output = enter_scope_sync(scope, work);
        (scope, output, subscription.finish())
    }

    /// Render on success, discard on failure. The subscription is already
    /// released when this runs.
    fn complete<R, E>(&self, scope: ScopeId, outcome: Result<R, E>, events: Vec<QueryEvent>) -> Result<R, E>
    where
        R: ResponseSink,
    {
        let mut response = match outcome {
            Ok(response) => response,
            Err(e) => {
                ReportDiscardedEvent {
                    scope,
                    queries: events.len(),
                    reason: "unit_of_work_failed",
                }
                .emit();
                return Err(e);
            }
        };

        let rendered = catch_unwind(AssertUnwindSafe(|| {
            self.renderer.render(&events, &mut response)
        }))
        .unwrap_or_else(|panic| Err(RenderError::Panicked(panic_message(panic.as_ref()))));

        match rendered {
            Ok(RenderOutcome::Injected { rows }) => {
                ReportRenderedEvent {
                    scope,
                    queries: rows,
                    cache_hits: events.iter().filter(|e| e.is_cached()).count(),
                    total_ms: events.iter().map(|e| e.duration_ms()).sum(),
                }
                .emit();
            }
            Ok(RenderOutcome::SkippedNonHtml) => {
                ReportDiscardedEvent {
                    scope,
                    queries: events.len(),
                    reason: "non_html_response",
                }
                .emit();
            }
            Err(e) => {
                RenderFailedEvent { scope, error: &e }.emit();
            }
        }

        Ok(response)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("notifier", &self.notifier)
            .field("renderer", &self.renderer)
            .field("event_name", &self.event_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use http::Request;

    use super::*;
    use crate::{
        activation::StaticPolicy,
        notifications::{bind_current_scope, Notification, SqlPayload},
        report::{Highlighter, TextResponse},
    };

    #[derive(Debug, PartialEq)]
    struct WorkFailed(&'static str);

    fn profiler(enabled: bool) -> (Profiler, Arc<Notifier>) {
        let notifier = Arc::new(Notifier::new());
        let policy = if enabled {
            StaticPolicy::always()
        } else {
            StaticPolicy::never()
        };
        let profiler = Profiler::new(Arc::new(policy))
            .with_notifier(Arc::clone(&notifier))
            .with_renderer(ReportRenderer::plain());
        (profiler, notifier)
    }

    fn emit(notifier: &Notifier, sql: &str, duration_ms: f64) {
        notifier.publish(&Notification::sql(SqlPayload::new(sql), duration_ms));
    }

    fn rows(body: &str) -> Vec<&str> {
        body.match_indices("<td class=sql-data>")
            .map(|(i, m)| {
                let start = i + m.len();
                let end = start + body[start..].find("</td>").unwrap();
                &body[start..end]
            })
            .collect()
    }

    #[tokio::test]
    async fn test_collects_statements_in_emission_order() {
        let (profiler, notifier) = profiler(true);

        for n in [0usize, 1, 5] {
            let response = profiler
                .run_if(true, async {
                    for i in 0..n {
                        emit(&notifier, &format!("SELECT {}", i), 0.1);
                    }
                    Ok::<_, WorkFailed>(TextResponse::html("<p>ok</p>"))
                })
                .await
                .unwrap();

            let expected: Vec<String> = (0..n).map(|i| format!("SELECT {}", i)).collect();
            assert_eq!(rows(&response.body), expected);
            assert_eq!(notifier.listener_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_disabled_registers_nothing() {
        let (profiler, notifier) = profiler(false);
        let observed = Arc::new(AtomicUsize::new(0));

        let probe = Arc::clone(&notifier);
        let seen = Arc::clone(&observed);
        let response = profiler
            .run_if(false, async move {
                seen.store(probe.listener_count(), Ordering::SeqCst);
                emit(&probe, "SELECT 1", 0.1);
                Ok::<_, WorkFailed>(TextResponse::html("<p>ok</p>"))
            })
            .await
            .unwrap();

        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert_eq!(response.body, "<p>ok</p>");
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_policy_gate_via_request_context() {
        let (profiler, notifier) = profiler(false);
        let request = Request::builder().uri("/").body(()).unwrap();
        let ctx = RequestContext::from_request(&request);
        assert!(!profiler.is_enabled(&ctx));

        let response = profiler
            .run_instrumented(&ctx, async {
                emit(&notifier, "SELECT 1", 0.1);
                Ok::<_, WorkFailed>(TextResponse::html("page"))
            })
            .await
            .unwrap();
        assert_eq!(response.body, "page");
    }

    #[tokio::test]
    async fn test_listener_active_during_work_only() {
        let (profiler, notifier) = profiler(true);
        let during = Arc::new(AtomicUsize::new(0));

        let probe = Arc::clone(&notifier);
        let seen = Arc::clone(&during);
        profiler
            .run_if(true, async move {
                seen.store(probe.listener_count(), Ordering::SeqCst);
                Ok::<_, WorkFailed>(TextResponse::html(""))
            })
            .await
            .unwrap();

        assert_eq!(during.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_propagates_and_releases() {
        let (profiler, notifier) = profiler(true);

        let result: Result<TextResponse, WorkFailed> = profiler
            .run_if(true, async {
                emit(&notifier, "SELECT 1", 0.1);
                emit(&notifier, "SELECT 2", 0.1);
                Err(WorkFailed("db down"))
            })
            .await;

        assert_eq!(result.unwrap_err(), WorkFailed("db down"));
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_buffer_holds_prior_statements() {
        let (profiler, notifier) = profiler(true);

        let (_, outcome, events) = profiler
            .collect(async {
                emit(&notifier, "SELECT 1", 0.1);
                emit(&notifier, "SELECT 2", 0.2);
                Err::<TextResponse, _>(WorkFailed("db down"))
            })
            .await;

        assert_eq!(outcome.unwrap_err(), WorkFailed("db down"));
        let sqls: Vec<&str> = events.iter().map(|e| e.sql()).collect();
        assert_eq!(sqls, vec!["SELECT 1", "SELECT 2"]);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_collect_blocking_failure() {
        let (profiler, notifier) = profiler(true);

        let (_, outcome, events) = profiler.collect_blocking(|| {
            emit(&notifier, "UPDATE t SET x = 1", 0.1);
            emit(&notifier, "SELECT 2", 0.1);
            Err::<(), _>(WorkFailed("constraint"))
        });

        assert_eq!(outcome, Err(WorkFailed("constraint")));
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].sequence(), 1);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_early_return_releases() {
        let (profiler, notifier) = profiler(true);

        let result: Result<TextResponse, WorkFailed> = profiler
            .run_if(true, async {
                let cached: Option<&str> = None;
                let Some(_) = cached else {
                    return Ok(TextResponse::json("{}"));
                };
                emit(&notifier, "unreachable", 0.1);
                Ok(TextResponse::html(""))
            })
            .await;

        assert_eq!(result.unwrap().body, "{}");
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_work_releases() {
        let (profiler, notifier) = profiler(true);
        let profiler = Arc::new(profiler);

        let task_profiler = Arc::clone(&profiler);
        let handle = tokio::spawn(async move {
            task_profiler
                .run_if(true, async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, WorkFailed>(TextResponse::html(""))
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(notifier.listener_count(), 1);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_non_html_response_unchanged() {
        let (profiler, notifier) = profiler(true);

        let response = profiler
            .run_if(true, async {
                emit(&notifier, "SELECT 1", 0.1);
                Ok::<_, WorkFailed>(TextResponse::json(r#"{"id":1}"#))
            })
            .await
            .unwrap();

        assert_eq!(response, TextResponse::json(r#"{"id":1}"#));
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_render_fault_keeps_response() {
        struct RejectingSink(String);

        impl ResponseSink for RejectingSink {
            fn content_type(&self) -> Option<&str> {
                Some("text/html")
            }

            fn append_body(&mut self, _fragment: &str) -> Result<(), RenderError> {
                Err(RenderError::Sink("read-only".to_string()))
            }
        }

        let (profiler, notifier) = profiler(true);
        let response = profiler
            .run_if(true, async {
                emit(&notifier, "SELECT 1", 0.1);
                Ok::<_, WorkFailed>(RejectingSink("original".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(response.0, "original");
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_render_panic_is_contained() {
        struct Exploding;

        impl Highlighter for Exploding {
            fn highlight(&self, _text: &str, _language: &str) -> Option<String> {
                panic!("highlighter bug");
            }

            fn name(&self) -> &str {
                "exploding"
            }
        }

        let (profiler, notifier) = profiler(true);
        let profiler = profiler.with_renderer(ReportRenderer::new(StatementFormatter::with_engine(
            Arc::new(Exploding),
        )));

        let response = profiler
            .run_if(true, async {
                emit(&notifier, "SELECT 1", 0.1);
                Ok::<_, WorkFailed>(TextResponse::html("<p>page</p>"))
            })
            .await
            .unwrap();

        assert_eq!(response.body, "<p>page</p>");
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_units_are_isolated() {
        let (profiler, notifier) = profiler(true);
        let profiler = Arc::new(profiler);

        let mut handles = Vec::new();
        for unit in 0..8 {
            let profiler = Arc::clone(&profiler);
            let notifier = Arc::clone(&notifier);
            handles.push(tokio::spawn(async move {
                profiler
                    .run_if(true, async {
                        for i in 0..20 {
                            emit(&notifier, &format!("unit{}-q{}", unit, i), 0.1);
                            tokio::task::yield_now().await;
                        }
                        Ok::<_, WorkFailed>(TextResponse::html(""))
                    })
                    .await
                    .map(|response| (unit, response))
            }));
        }

        for handle in handles {
            let (unit, response) = handle.await.unwrap().unwrap();
            let expected: Vec<String> = (0..20).map(|i| format!("unit{}-q{}", unit, i)).collect();
            assert_eq!(rows(&response.body), expected);
        }
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_spawned_work_bound_to_scope() {
        let (profiler, notifier) = profiler(true);

        let response = profiler
            .run_if(true, async {
                let inner = Arc::clone(&notifier);
                tokio::spawn(bind_current_scope(async move {
                    emit(&inner, "SELECT from_spawned", 0.1);
                }))
                .await
                .unwrap();

                let inner = Arc::clone(&notifier);
                tokio::spawn(async move {
                    emit(&inner, "SELECT unbound", 0.1);
                })
                .await
                .unwrap();

                Ok::<_, WorkFailed>(TextResponse::html(""))
            })
            .await
            .unwrap();

        assert_eq!(rows(&response.body), vec!["SELECT from_spawned"]);
    }

    #[test]
    fn test_blocking_variant() {
        let (profiler, notifier) = profiler(true);

        let response = profiler
            .run_if_blocking(true, || {
                emit(&notifier, "SELECT * FROM users WHERE id = 1", 1.2345);
                Ok::<_, WorkFailed>(TextResponse::html(""))
            })
            .unwrap();

        assert!(response.body.contains("<td class=duration-data>1.234ms</td>"));
        assert!(response.body.contains("<td class=cache-data>false</td>"));
        assert_eq!(rows(&response.body), vec!["SELECT * FROM users WHERE id = 1"]);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_blocking_panic_releases() {
        let (profiler, notifier) = profiler(true);

        let result = catch_unwind(AssertUnwindSafe(|| {
            profiler.run_if_blocking(true, || -> Result<TextResponse, WorkFailed> {
                emit(&notifier, "SELECT 1", 0.1);
                panic!("handler panicked");
            })
        }));

        assert!(result.is_err());
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_blocking_with_request_context() {
        let (profiler, notifier) = profiler(true);
        let request = Request::builder().uri("/").body(()).unwrap();

        let response = profiler
            .run_instrumented_blocking(&RequestContext::from_request(&request), || {
                emit(&notifier, "SELECT 1", 0.1);
                Ok::<_, WorkFailed>(TextResponse::html(""))
            })
            .unwrap();
        assert_eq!(rows(&response.body), vec!["SELECT 1"]);
    }

    #[test]
    fn test_from_config() {
        let config = PeekConfig::enabled().with_modal_title("Queries");
        let profiler = Profiler::from_config(&config);
        let request = Request::builder().uri("/").body(()).unwrap();
        assert!(profiler.is_enabled(&RequestContext::from_request(&request)));
        assert_eq!(profiler.renderer().title(), "Queries");
        assert!(Arc::ptr_eq(profiler.notifier(), notifications::global()));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"boom".to_string()), "boom");
        assert_eq!(panic_message(&42), "unknown panic");
    }
}
