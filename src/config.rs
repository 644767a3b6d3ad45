//! Logger configuration and severity levels.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

pub(crate) const DEFAULT_ENVIRONMENT: &str = "production";
pub(crate) const DEFAULT_OUTPUT_PATH: &str = "stdout";
pub(crate) const DEFAULT_ERROR_OUTPUT_PATH: &str = "stderr";
pub(crate) const DEFAULT_CORRELATION_HEADER: &str = "x-request-id";

/// Severity of a log record.
///
/// Serialized in capitals (`"INFO"`), and ordered so that a logger configured
/// at a given level emits records at that level and above.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// Verbose diagnostics, off in most deployments.
    Debug,
    /// Routine operational records.
    Info,
    /// Something surprising that did not fail the operation.
    Warn,
    /// A failed operation. Records at this level carry a stacktrace.
    Error,
}

impl Level {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for loggers and the request middleware.
///
/// Every field has a working default, so `LoggerConfig::default()` is a valid
/// production configuration. String fields left empty are treated as unset
/// and replaced with their defaults when a logger is built.
///
/// ```
/// use svclog::LoggerConfig;
///
/// let config = LoggerConfig::default()
///     .with_environment("staging")
///     .with_ignored_path("/health");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Deployment environment name, attached to every record. Default
    /// `"production"`.
    pub environment: String,
    /// Where records are written: `stdout`, `stderr`, or `memory://<name>`
    /// for a sink registered with [`MemorySink::register`](crate::MemorySink::register).
    /// Default `"stdout"`.
    pub output_path: String,
    /// Where the logger's own write failures are reported. Default `"stderr"`.
    pub error_output_path: String,
    /// HTTP header carrying the correlation id. Default `"x-request-id"`.
    pub correlation_header: String,
    /// Resource paths excluded from request instrumentation entirely.
    pub ignored_paths: HashSet<String>,
    /// When set, the middleware also places the resolved correlation id into
    /// the request extensions as a [`TraceContext`](crate::TraceContext), and
    /// records use the `trace_id` key instead of `context_id`.
    pub inject_trace_context: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_owned(),
            output_path: DEFAULT_OUTPUT_PATH.to_owned(),
            error_output_path: DEFAULT_ERROR_OUTPUT_PATH.to_owned(),
            correlation_header: DEFAULT_CORRELATION_HEADER.to_owned(),
            ignored_paths: HashSet::new(),
            inject_trace_context: false,
        }
    }
}

impl LoggerConfig {
    /// Set the environment name.
    pub fn with_environment<S: Into<String>>(mut self, environment: S) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set the record output path.
    pub fn with_output_path<S: Into<String>>(mut self, output_path: S) -> Self {
        self.output_path = output_path.into();
        self
    }

    /// Set the path where the logger reports its own write failures.
    pub fn with_error_output_path<S: Into<String>>(mut self, error_output_path: S) -> Self {
        self.error_output_path = error_output_path.into();
        self
    }

    /// Set the correlation header name.
    pub fn with_correlation_header<S: Into<String>>(mut self, correlation_header: S) -> Self {
        self.correlation_header = correlation_header.into();
        self
    }

    /// Exclude a resource path from request instrumentation.
    pub fn with_ignored_path<S: Into<String>>(mut self, path: S) -> Self {
        self.ignored_paths.insert(path.into());
        self
    }

    /// Enable or disable trace-context injection.
    pub fn with_trace_injection(mut self, inject: bool) -> Self {
        self.inject_trace_context = inject;
        self
    }

    /// Copy of the config with empty string fields replaced by defaults.
    pub(crate) fn normalized(&self) -> Self {
        fn or_default(value: &str, default: &str) -> String {
            if value.is_empty() {
                default.to_owned()
            } else {
                value.to_owned()
            }
        }

        Self {
            environment: or_default(&self.environment, DEFAULT_ENVIRONMENT),
            output_path: or_default(&self.output_path, DEFAULT_OUTPUT_PATH),
            error_output_path: or_default(&self.error_output_path, DEFAULT_ERROR_OUTPUT_PATH),
            correlation_header: or_default(&self.correlation_header, DEFAULT_CORRELATION_HEADER),
            ignored_paths: self.ignored_paths.clone(),
            inject_trace_context: self.inject_trace_context,
        }
    }
}
