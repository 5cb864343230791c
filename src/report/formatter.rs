//! Statement formatting for the report table.
//!
//! The highlighting engine is optional. Its availability is probed once per
//! process and cached; every [`StatementFormatter`] built by
//! [`StatementFormatter::probe`] shares that answer. Without an engine,
//! statements are HTML-escaped.

use std::{
    borrow::Cow,
    fmt,
    sync::{Arc, OnceLock},
};

use tracing::debug;

/// Language hint passed to highlighting engines.
pub const SQL_LANGUAGE: &str = "sql";

/// A syntax highlighting engine producing HTML.
///
/// Output is embedded verbatim, so implementations must escape the text
/// themselves.
pub trait Highlighter: Send + Sync {
    /// Highlight `text`, or `None` when the engine cannot handle it.
    fn highlight(&self, text: &str, language: &str) -> Option<String>;

    /// Engine name for diagnostics.
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum HighlighterError {
    #[error("Highlighter availability was already probed; install the engine before first use")]
    AlreadyProbed,
}

static ENGINE: OnceLock<Option<Arc<dyn Highlighter>>> = OnceLock::new();

/// Install the process-wide highlighting engine.
///
/// Must run before the first [`probe_highlighter`] call; afterwards the
/// probed answer is fixed for the process lifetime.
pub fn install_highlighter(engine: Arc<dyn Highlighter>) -> Result<(), HighlighterError> {
    ENGINE
        .set(Some(engine))
        .map_err(|_| HighlighterError::AlreadyProbed)
}

/// Probe for a highlighting engine once and cache the result.
pub fn probe_highlighter() -> Option<Arc<dyn Highlighter>> {
    ENGINE
        .get_or_init(|| {
            let engine = default_engine();
            debug!(
                available = engine.is_some(),
                "Probed SQL highlighting engine"
            );
            engine
        })
        .clone()
}

#[cfg(feature = "highlight")]
fn default_engine() -> Option<Arc<dyn Highlighter>> {
    Some(Arc::new(super::highlight::SqlHighlighter::new()))
}

#[cfg(not(feature = "highlight"))]
fn default_engine() -> Option<Arc<dyn Highlighter>> {
    None
}

/// Escape text for embedding in HTML element content or attribute values.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text
        .bytes()
        .any(|b| matches!(b, b'&' | b'<' | b'>' | b'"' | b'\''))
    {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Converts statement text into HTML-safe display markup.
#[derive(Clone, Default)]
pub struct StatementFormatter {
    engine: Option<Arc<dyn Highlighter>>,
}

impl StatementFormatter {
    /// Formatter using the process-wide probed engine, if any.
    pub fn probe() -> Self {
        Self {
            engine: probe_highlighter(),
        }
    }

    /// Formatter that only escapes.
    pub fn plain() -> Self {
        Self { engine: None }
    }

    /// Formatter with an explicit engine.
    pub fn with_engine(engine: Arc<dyn Highlighter>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub fn is_highlighting(&self) -> bool {
        self.engine.is_some()
    }

    /// Format a statement. Never fails.
    pub fn format(&self, sql: &str) -> String {
        if let Some(engine) = &self.engine {
            if let Some(html) = engine.highlight(sql, SQL_LANGUAGE) {
                return html;
            }
        }
        escape_html(sql).into_owned()
    }
}

impl fmt::Debug for StatementFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementFormatter")
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Brackets;

    impl Highlighter for Brackets {
        fn highlight(&self, text: &str, language: &str) -> Option<String> {
            if text.is_empty() {
                return None;
            }
            Some(format!("[{}:{}]", language, escape_html(text)))
        }

        fn name(&self) -> &str {
            "brackets"
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_escape_html_borrows_clean_text() {
        assert!(matches!(
            escape_html("SELECT * FROM users WHERE id = 1"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_plain_formatter_escapes() {
        let formatter = StatementFormatter::plain();
        assert!(!formatter.is_highlighting());
        assert_eq!(
            formatter.format("SELECT * FROM t WHERE a < 'b'"),
            "SELECT * FROM t WHERE a &lt; &#39;b&#39;"
        );
    }

    #[test]
    fn test_engine_output_is_verbatim() {
        let formatter = StatementFormatter::with_engine(Arc::new(Brackets));
        assert!(formatter.is_highlighting());
        assert_eq!(formatter.format("SELECT 1"), "[sql:SELECT 1]");
    }

    #[test]
    fn test_engine_decline_falls_back_to_escaping() {
        let formatter = StatementFormatter::with_engine(Arc::new(Brackets));
        assert_eq!(formatter.format(""), "");
    }

    #[test]
    fn test_probe_is_cached() {
        let first = probe_highlighter().is_some();
        let second = probe_highlighter().is_some();
        assert_eq!(first, second);
        assert!(matches!(
            install_highlighter(Arc::new(Brackets)),
            Err(HighlighterError::AlreadyProbed)
        ));
    }

    #[cfg(feature = "highlight")]
    #[test]
    fn test_probe_finds_builtin_engine() {
        assert!(StatementFormatter::probe().is_highlighting());
    }
}
