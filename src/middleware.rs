//! axum integration.
//!
//! ```ignore
//! let state = PeekState::from_config(&PeekConfig::enabled());
//! let app = Router::new()
//!     .route("/", get(index))
//!     .layer(axum::middleware::from_fn_with_state(state, query_peek_middleware));
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, response::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body::Body as _;
use tracing::warn;

use crate::{
    activation::RequestContext,
    config::PeekConfig,
    observability::events::{ActivationSkippedEvent, Event},
    profiler::Profiler,
    report::{is_html, RenderError, ResponseSink},
};

/// State for [`query_peek_middleware`].
#[derive(Clone)]
pub struct PeekState {
    pub profiler: Arc<Profiler>,

    /// Largest HTML body buffered for injection
    pub max_body_bytes: usize,
}

impl PeekState {
    pub fn new(profiler: Arc<Profiler>, max_body_bytes: usize) -> Self {
        Self {
            profiler,
            max_body_bytes,
        }
    }

    pub fn from_config(config: &PeekConfig) -> Self {
        Self::new(Arc::new(Profiler::from_config(config)), config.max_body_bytes)
    }
}

/// A response whose body may have been read into memory.
#[derive(Debug)]
pub enum CapturedResponse {
    /// HTML body held in memory; appends are possible
    Buffered { parts: Parts, body: Vec<u8> },
    /// Body left as produced by the handler
    Passthrough(Response),
}

impl CapturedResponse {
    /// Buffer `response` if it is uncompressed HTML with a known size of at
    /// most `limit` bytes.
    pub async fn capture(response: Response, limit: usize) -> Result<Self, axum::Error> {
        let html = content_type(response.headers()).is_some_and(is_html);
        if !html || is_encoded(response.headers()) {
            return Ok(Self::Passthrough(response));
        }
        let fits = response
            .body()
            .size_hint()
            .upper()
            .is_some_and(|upper| upper <= limit as u64);
        if !fits {
            return Ok(Self::Passthrough(response));
        }

        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, limit).await?;
        Ok(Self::Buffered {
            parts,
            body: bytes.to_vec(),
        })
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered { .. })
    }

    fn headers(&self) -> &http::HeaderMap {
        match self {
            Self::Buffered { parts, .. } => &parts.headers,
            Self::Passthrough(response) => response.headers(),
        }
    }
}

fn content_type(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
}

/// Body bytes are compressed; appending plain text would corrupt them.
fn is_encoded(headers: &http::HeaderMap) -> bool {
    headers
        .get_all(header::CONTENT_ENCODING)
        .iter()
        .any(|value| !value.as_bytes().eq_ignore_ascii_case(b"identity"))
}

impl ResponseSink for CapturedResponse {
    fn content_type(&self) -> Option<&str> {
        content_type(self.headers())
    }

    fn append_body(&mut self, fragment: &str) -> Result<(), RenderError> {
        match self {
            Self::Buffered { parts, body } => {
                body.extend_from_slice(fragment.as_bytes());
                parts.headers.remove(header::CONTENT_LENGTH);
                Ok(())
            }
            Self::Passthrough(_) => Err(RenderError::BodyNotBuffered),
        }
    }
}

impl IntoResponse for CapturedResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Buffered { parts, body } => Response::from_parts(parts, Body::from(body)),
            Self::Passthrough(response) => response,
        }
    }
}

/// Profile the downstream handler and append the query report to HTML pages.
///
/// Requests the activation policy rejects are forwarded untouched. A failure
/// while reading the handler's body yields `500` without a report.
pub async fn query_peek_middleware(
    State(state): State<PeekState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.profiler.is_enabled(&RequestContext::from_request(&request)) {
        ActivationSkippedEvent.emit();
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let limit = state.max_body_bytes;

    let work = async move {
        let response = next.run(request).await;
        CapturedResponse::capture(response, limit).await
    };

    match state.profiler.run_if(true, work).await {
        Ok(captured) => captured.into_response(),
        Err(e) => {
            warn!(%method, %path, error = %e, "Failed to read response body for query report");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read response body").into_response()
        }
    }
}
