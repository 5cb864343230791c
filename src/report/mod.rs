//! Query report rendering.
//!
//! Turns the statements collected for one unit of work into a table and
//! appends it, wrapped in a modal, to HTML responses. Non-HTML responses are
//! left untouched and the collected statements are dropped.

pub mod formatter;
#[cfg(feature = "highlight")]
pub mod highlight;
pub mod markup;
pub mod sink;

use serde::Serialize;

use crate::profiler::QueryEvent;

pub use formatter::{
    escape_html, install_highlighter, probe_highlighter, Highlighter, HighlighterError,
    StatementFormatter, SQL_LANGUAGE,
};
#[cfg(feature = "highlight")]
pub use highlight::SqlHighlighter;
pub use sink::{is_html, ResponseSink, TextResponse};

/// Default modal title.
pub const DEFAULT_TITLE: &str = "SQL Queries";

/// Error raised while appending a report to a response.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Response body is streaming and cannot be appended to")]
    BodyNotBuffered,

    #[error("Response sink rejected the report: {0}")]
    Sink(String),

    #[error("Report rendering panicked: {0}")]
    Panicked(String),
}

/// What [`ReportRenderer::render`] did with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Fragment appended with this many rows
    Injected { rows: usize },
    /// Response is not HTML; left untouched
    SkippedNonHtml,
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub duration_ms: f64,
    pub cached: bool,
    /// HTML-safe statement markup
    pub sql_html: String,
}

impl ReportRow {
    /// Duration with three decimals, e.g. `"1.234ms"`.
    pub fn duration_label(&self) -> String {
        format!("{:.3}ms", self.duration_ms)
    }
}

/// Rows for one unit of work, in collection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub rows: Vec<ReportRow>,
}

impl Report {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.rows.iter().map(|r| r.duration_ms).sum()
    }

    pub fn cache_hits(&self) -> usize {
        self.rows.iter().filter(|r| r.cached).count()
    }
}

/// Builds reports and appends them to responses.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    formatter: StatementFormatter,
    title: String,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self::new(StatementFormatter::probe())
    }
}

impl ReportRenderer {
    pub fn new(formatter: StatementFormatter) -> Self {
        Self {
            formatter,
            title: DEFAULT_TITLE.to_string(),
        }
    }

    /// Renderer that never highlights.
    pub fn plain() -> Self {
        Self::new(StatementFormatter::plain())
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn formatter(&self) -> &StatementFormatter {
        &self.formatter
    }

    /// Shape collected events into report rows.
    pub fn report(&self, events: &[QueryEvent]) -> Report {
        Report {
            rows: events
                .iter()
                .map(|event| ReportRow {
                    duration_ms: event.duration_ms(),
                    cached: event.is_cached(),
                    sql_html: self.formatter.format(event.sql()),
                })
                .collect(),
        }
    }

    /// Full HTML fragment for `events`.
    pub fn fragment(&self, events: &[QueryEvent]) -> String {
        markup::render_fragment(&self.report(events), &self.title)
    }

    /// Append the report to `response` if it is HTML.
    ///
    /// The fragment is built completely before a single append, so a failure
    /// leaves the body as it was.
    pub fn render<S>(&self, events: &[QueryEvent], response: &mut S) -> Result<RenderOutcome, RenderError>
    where
        S: ResponseSink + ?Sized,
    {
        if !response.content_type().is_some_and(is_html) {
            return Ok(RenderOutcome::SkippedNonHtml);
        }

        let fragment = self.fragment(events);
        response.append_body(&fragment)?;
        Ok(RenderOutcome::Injected { rows: events.len() })
    }
}
