//! Configuration types for the query profiler.

use serde::{Deserialize, Serialize};

use crate::notifications::SQL_EVENT;

/// Error returned when loading a [`PeekConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse profiler config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid profiler config: {0}")]
    Invalid(String),
}

/// Toggles consumed by [`ConfigPolicy`](crate::activation::ConfigPolicy).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Profile every request
    #[serde(default)]
    pub enabled: bool,

    /// Override for query tracking; `None` follows `enabled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries_enabled: Option<bool>,

    /// Request header that opts a single request in (e.g. "x-peek")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle_header: Option<String>,
}

/// Complete profiler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeekConfig {
    /// When to profile
    #[serde(default)]
    pub activation: ActivationConfig,

    /// Event name the profiler subscribes to
    #[serde(default = "default_event_name")]
    pub event_name: String,

    /// Largest HTML body (bytes) the middleware buffers to inject a report
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Use the SQL highlighter when one is available
    #[serde(default = "default_highlight")]
    pub highlight: bool,

    /// Title shown in the report modal
    #[serde(default = "default_modal_title")]
    pub modal_title: String,
}

fn default_event_name() -> String {
    SQL_EVENT.to_string()
}

fn default_max_body_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_highlight() -> bool {
    true
}

fn default_modal_title() -> String {
    "SQL Queries".to_string()
}

impl Default for PeekConfig {
    fn default() -> Self {
        Self {
            activation: ActivationConfig::default(),
            event_name: default_event_name(),
            max_body_bytes: default_max_body_bytes(),
            highlight: default_highlight(),
            modal_title: default_modal_title(),
        }
    }
}

impl PeekConfig {
    /// Config that profiles every request.
    pub fn enabled() -> Self {
        Self {
            activation: ActivationConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_toggle_header(mut self, header: impl Into<String>) -> Self {
        self.activation.toggle_header = Some(header.into());
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_modal_title(mut self, title: impl Into<String>) -> Self {
        self.modal_title = title.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_name.trim().is_empty() {
            return Err(ConfigError::Invalid("event_name must not be empty".to_string()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if let Some(header) = &self.activation.toggle_header {
            if http::HeaderName::from_bytes(header.as_bytes()).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "toggle_header '{}' is not a valid header name",
                    header
                )));
            }
        }
        Ok(())
    }
}
