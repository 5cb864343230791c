//! Unit-of-work scopes.
//!
//! A scope identifies one instrumented unit of work. The current scope is
//! carried in a tokio task-local, so concurrent requests on the same runtime
//! each see their own value. Scoped listeners only receive notifications
//! published while their scope is current.

use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_SCOPE: ScopeId;
}

/// Identifier of one instrumented unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Allocate a fresh, process-unique scope id.
    #[inline]
    pub fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// The scope of the calling task, if it runs inside one.
#[inline]
pub fn current_scope() -> Option<ScopeId> {
    CURRENT_SCOPE.try_with(|scope| *scope).ok()
}

/// Run `fut` with `scope` as the current scope.
pub async fn enter_scope<F: Future>(scope: ScopeId, fut: F) -> F::Output {
    CURRENT_SCOPE.scope(scope, fut).await
}

/// Run `f` synchronously with `scope` as the current scope.
pub fn enter_scope_sync<R>(scope: ScopeId, f: impl FnOnce() -> R) -> R {
    CURRENT_SCOPE.sync_scope(scope, f)
}

/// Capture the caller's scope and re-enter it when `fut` runs.
///
/// Task-locals do not follow `tokio::spawn`; wrap spawned futures with this
/// so statements they execute are still attributed to the request.
pub fn bind_current_scope<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    let scope = current_scope();
    async move {
        match scope {
            Some(scope) => CURRENT_SCOPE.scope(scope, fut).await,
            None => fut.await,
        }
    }
}
