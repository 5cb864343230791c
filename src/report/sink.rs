//! Response abstraction the renderer writes to.

use super::RenderError;

/// An outgoing response the report can be appended to.
///
/// The renderer only reads the content type and appends; it never replaces
/// the body or touches status and headers.
pub trait ResponseSink {
    /// Value of the `Content-Type` header, if any.
    fn content_type(&self) -> Option<&str>;

    /// Append markup to the end of the body.
    fn append_body(&mut self, fragment: &str) -> Result<(), RenderError>;
}

/// Whether a content type denotes an HTML document.
#[inline]
pub fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

/// Fully buffered text response for hosts without a streaming body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl TextResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some(content_type.into()),
            body: body.into(),
        }
    }

    /// `200 OK` HTML response.
    pub fn html(body: impl Into<String>) -> Self {
        Self::new(200, "text/html; charset=utf-8", body)
    }

    /// `200 OK` JSON response.
    pub fn json(body: impl Into<String>) -> Self {
        Self::new(200, "application/json", body)
    }
}

impl ResponseSink for TextResponse {
    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn append_body(&mut self, fragment: &str) -> Result<(), RenderError> {
        self.body.push_str(fragment);
        Ok(())
    }
}
