//! Subscriber setup for applications embedding the profiler.
//!
//! The profiler only emits through `tracing`; hosts that already install a
//! subscriber can skip this module. [`init_logging`] is for binaries and demos
//! that want console output (text or JSON) plus an optional daily log file.

use std::{io, path::PathBuf};

use tracing::{Level, Subscriber};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    fmt::{time::ChronoUtc, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use super::events;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Target of every log line this crate produces.
pub const PROFILER_TARGET: &str = "query_peek";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// One JSON object per line instead of text
    pub json_format: bool,
    /// Directory for daily-rotated log files; console only when `None`
    pub log_dir: Option<PathBuf>,
    pub colorize: bool,
    pub log_file_name: String,
    /// Host targets logged next to the profiler (e.g. the app's db module)
    pub app_targets: Vec<String>,
    /// Log profiler lifecycle events at INFO instead of DEBUG
    pub promote_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            log_dir: None,
            colorize: true,
            log_file_name: "query-peek".to_string(),
            app_targets: Vec::new(),
            promote_events: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_app_target(mut self, target: impl Into<String>) -> Self {
        self.app_targets.push(target.into());
        self
    }

    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub fn filter_directives(&self) -> String {
        let level = level_name(self.level);
        std::iter::once(PROFILER_TARGET)
            .chain(self.app_targets.iter().map(String::as_str))
            .map(|target| format!("{}={}", target, level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Keeps the background file writer alive; drop it last.
pub struct LogGuard {
    file_guard: Option<WorkerGuard>,
}

impl LogGuard {
    pub fn has_file_writer(&self) -> bool {
        self.file_guard.is_some()
    }
}

const fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

fn fmt_layer<S, W>(json: bool, ansi: bool, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(ansi)
        .with_target(true)
        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
        .with_writer(writer);

    if json {
        layer.json().flatten_event(true).boxed()
    } else {
        layer.boxed()
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides [`LoggingConfig::filter_directives`]. Installing twice
/// is not an error; the first subscriber stays in place.
pub fn init_logging(config: LoggingConfig) -> Result<LogGuard, LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let mut layers = vec![fmt_layer(config.json_format, config.colorize, io::stdout)];

    let mut file_guard = None;
    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, &config.log_file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(config.json_format, false, writer));
        file_guard = Some(guard);
    }

    let _ = LogTracer::init();
    events::set_promoted(config.promote_events);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init();

    Ok(LogGuard { file_guard })
}
