//! The base logger, per-call derived loggers, and the one-time registry.

use std::panic::Location;
use std::sync::Arc;

use actix_web::http::header::HeaderMap;
use actix_web::{HttpMessage, HttpRequest};
use chrono::Utc;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::{Level, LoggerConfig};
use crate::error::Error;
use crate::sink::Sink;

/// Field bag attached to records under `labels`.
///
/// Values are [`serde_json::Value`], a closed set of shapes (string, number,
/// bool, null, array, object), so encoders and test assertions can be
/// exhaustive.
pub type Labels = Map<String, Value>;

pub(crate) const CONTEXT_ID_KEY: &str = "context_id";
pub(crate) const TRACE_ID_KEY: &str = "trace_id";

/// Correlation id carried through a request's extensions.
///
/// The request middleware inserts one when `inject_trace_context` is enabled;
/// handlers read it back through
/// [`LoggerRegistry::logger_from_request`] (or directly, via
/// [`HttpMessage::extensions`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceContext(pub String);

/// Host identity attached to every record as `resource_labels`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub(crate) struct ResourceLabels {
    hostname: String,
    pid: u32,
}

fn resource_labels() -> ResourceLabels {
    ResourceLabels {
        hostname: gethostname::gethostname().to_string_lossy().into_owned(),
        pid: std::process::id(),
    }
}

#[derive(Debug)]
struct Core {
    namespace: String,
    environment: String,
    level: Level,
    resource_labels: ResourceLabels,
    correlation_header: String,
    sink: Sink,
    error_sink: Sink,
}

/// Leveled application record. `severity` and `text_payload` are always
/// present; the source fields depend on how the record was produced.
#[derive(Serialize)]
struct AppRecord<'a> {
    timestamp: i64,
    severity: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_function: Option<&'a str>,
    source_caller: String,
    text_payload: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_stacktrace: Option<String>,
    namespace: &'a str,
    environment: &'a str,
    resource_labels: &'a ResourceLabels,
    labels: &'a Labels,
}

/// Severity-less event record used for request instrumentation. Captured
/// fields sit at the top level next to the static ones.
#[derive(Serialize)]
struct EventRecord<'a> {
    timestamp: i64,
    namespace: &'a str,
    environment: &'a str,
    resource_labels: &'a ResourceLabels,
    #[serde(flatten)]
    fields: Labels,
}

/// The immutable, shareable base of a family of loggers.
///
/// Construction fixes the static fields (namespace, environment, hostname,
/// pid), the minimum level, and the sinks; everything after that is a cheap
/// [`DerivedLogger`] view. Cloning shares the same underlying state.
#[derive(Clone)]
#[derive(Debug)]
pub struct BaseLogger {
    core: Arc<Core>,
}

impl BaseLogger {
    /// Build a logger from a configuration.
    ///
    /// # Errors
    ///
    /// Fails if either output path cannot be resolved into a sink. This is a
    /// startup-time failure and should be treated as fatal by callers.
    pub fn new(namespace: &str, level: Level, config: &LoggerConfig) -> Result<Self, Error> {
        let config = config.normalized();
        let sink = Sink::resolve(&config.output_path)?;
        let error_sink = Sink::resolve(&config.error_output_path)?;
        Ok(Self {
            core: Arc::new(Core {
                namespace: namespace.to_owned(),
                environment: config.environment,
                level,
                resource_labels: resource_labels(),
                correlation_header: config.correlation_header,
                sink,
                error_sink,
            }),
        })
    }

    /// Derive a logger with a freshly generated `context_id`.
    pub fn fresh(&self) -> DerivedLogger {
        self.with_context_id(Uuid::new_v4().to_string())
    }

    /// Derive a logger with the given `context_id`, attached verbatim. The
    /// id is not validated; an empty string is accepted and logged as empty.
    pub fn with_context_id<S: Into<String>>(&self, context_id: S) -> DerivedLogger {
        DerivedLogger::with_correlation(self.clone(), CONTEXT_ID_KEY, context_id.into())
    }

    /// Derive a logger with the `context_id` taken from the configured
    /// correlation header. A missing or non-UTF-8 header value is logged as
    /// an empty id; this path is best-effort annotation, not propagation.
    pub fn from_headers(&self, headers: &HeaderMap) -> DerivedLogger {
        let context_id = headers
            .get(self.core.correlation_header.as_str())
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        self.with_context_id(context_id)
    }

    /// Derive a logger with the `trace_id` taken from the request's
    /// [`TraceContext`].
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MissingTraceContext`] when no context is present.
    /// Unlike [`from_headers`](Self::from_headers), this path is contractual:
    /// the caller relies on the middleware having placed the value there.
    pub fn from_request(&self, req: &HttpRequest) -> Result<DerivedLogger, Error> {
        let context = req
            .extensions()
            .get::<TraceContext>()
            .cloned()
            .ok_or(Error::MissingTraceContext)?;
        Ok(DerivedLogger::with_correlation(
            self.clone(),
            TRACE_ID_KEY,
            context.0,
        ))
    }

    fn write<T: Serialize>(&self, record: &T) {
        // A record that fails to serialize cannot be reported anywhere
        // better than the error sink, and emission never fails the caller.
        match serde_json::to_vec(record) {
            Ok(line) => {
                if let Err(err) = self.core.sink.write_record(line) {
                    self.core
                        .error_sink
                        .write_diagnostic(&format!("svclog: failed to write log record: {err}"));
                }
            }
            Err(err) => {
                self.core
                    .error_sink
                    .write_diagnostic(&format!("svclog: failed to encode log record: {err}"));
            }
        }
    }

    fn emit(
        &self,
        level: Level,
        message: &str,
        source_function: Option<&str>,
        source_caller: &Location<'_>,
        labels: &Labels,
    ) {
        if level < self.core.level {
            return;
        }
        let error_stacktrace = (level >= Level::Error)
            .then(|| std::backtrace::Backtrace::force_capture().to_string());
        self.write(&AppRecord {
            timestamp: Utc::now().timestamp_millis(),
            severity: level,
            source_function,
            source_caller: format!("{}:{}", source_caller.file(), source_caller.line()),
            text_payload: message,
            error_stacktrace,
            namespace: &self.core.namespace,
            environment: &self.core.environment,
            resource_labels: &self.core.resource_labels,
            labels,
        });
    }

    /// Emit a severity-less event record carrying `fields` at the top level.
    pub(crate) fn emit_event(&self, fields: Labels) {
        self.write(&EventRecord {
            timestamp: Utc::now().timestamp_millis(),
            namespace: &self.core.namespace,
            environment: &self.core.environment,
            resource_labels: &self.core.resource_labels,
            fields,
        });
    }
}

/// A per-call view over a [`BaseLogger`], adding the correlation id and any
/// caller-supplied fields under `labels`.
///
/// Derived loggers are transient: derive one where you need it, log through
/// it, drop it. They are cheap to clone and never outlive-constrain the base.
#[derive(Clone)]
pub struct DerivedLogger {
    base: BaseLogger,
    labels: Labels,
}

impl DerivedLogger {
    fn with_correlation(base: BaseLogger, key: &str, id: String) -> Self {
        let mut labels = Labels::new();
        labels.insert(key.to_owned(), Value::String(id));
        Self { base, labels }
    }

    /// Add a field under `labels`, returning the extended logger.
    #[must_use]
    pub fn with_field<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Log `message` at `level`.
    ///
    /// Prefer the `debug!`/`info!`/`warn!`/`error!` macros, which also
    /// capture the calling function for `source_function`. `extra` labels are
    /// merged over this logger's own for this record only.
    #[track_caller]
    pub fn log(&self, level: Level, message: &str, source_function: Option<&str>, extra: Labels) {
        let caller = Location::caller();
        if extra.is_empty() {
            self.base
                .emit(level, message, source_function, caller, &self.labels);
        } else {
            let mut labels = self.labels.clone();
            labels.extend(extra);
            self.base.emit(level, message, source_function, caller, &labels);
        }
    }

    /// Log `message` at DEBUG.
    #[track_caller]
    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message, None, Labels::new());
    }

    /// Log `message` at INFO.
    #[track_caller]
    pub fn info(&self, message: &str) {
        self.log(Level::Info, message, None, Labels::new());
    }

    /// Log `message` at WARN.
    #[track_caller]
    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message, None, Labels::new());
    }

    /// Log `message` at ERROR, with a stacktrace.
    #[track_caller]
    pub fn error(&self, message: &str) {
        self.log(Level::Error, message, None, Labels::new());
    }
}

/// Holds a process's application [`BaseLogger`] and builds it exactly once.
///
/// The registry is an ordinary value: construct one in your composition root
/// (typically as a `static`, since [`new`](Self::new) is `const`) and pass it
/// where it is needed. Nothing in this crate holds a hidden global logger.
///
/// ```
/// use svclog::{Level, LoggerConfig, LoggerRegistry};
///
/// static LOGGING: LoggerRegistry = LoggerRegistry::new();
///
/// # fn main() -> Result<(), svclog::Error> {
/// LOGGING.initialize("checkout", Level::Info, LoggerConfig::default())?;
/// let log = LOGGING.logger()?;
/// svclog::info!(log, "service started"; "port" => 8080);
/// # Ok(())
/// # }
/// ```
pub struct LoggerRegistry {
    base: OnceCell<BaseLogger>,
}

impl LoggerRegistry {
    /// An empty registry. Usable in `static` position.
    pub const fn new() -> Self {
        Self {
            base: OnceCell::new(),
        }
    }

    /// Build and store the base logger, once.
    ///
    /// The first call constructs the logger; every later call is a no-op,
    /// even with different arguments; later callers silently share the
    /// first configuration. Concurrent first calls serialize on the
    /// construction, and all of them return only after it completed.
    ///
    /// # Errors
    ///
    /// Returns the [`BaseLogger::new`] error if sink construction fails, in
    /// which case the registry stays uninitialized and `initialize` may be
    /// retried with a corrected configuration.
    pub fn initialize(
        &self,
        namespace: &str,
        level: Level,
        config: LoggerConfig,
    ) -> Result<(), Error> {
        self.base
            .get_or_try_init(|| BaseLogger::new(namespace, level, &config))?;
        Ok(())
    }

    /// The stored base logger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] before a successful
    /// [`initialize`](Self::initialize). Requesting a logger before
    /// initialization is a programmer error; most callers should propagate
    /// or fail fast on it.
    pub fn get(&self) -> Result<&BaseLogger, Error> {
        self.base.get().ok_or(Error::Uninitialized)
    }

    /// Derive a logger with a freshly generated `context_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] before [`initialize`](Self::initialize).
    pub fn logger(&self) -> Result<DerivedLogger, Error> {
        Ok(self.get()?.fresh())
    }

    /// Derive a logger with the given `context_id`, attached verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] before [`initialize`](Self::initialize).
    pub fn logger_with_id<S: Into<String>>(&self, context_id: S) -> Result<DerivedLogger, Error> {
        Ok(self.get()?.with_context_id(context_id))
    }

    /// Derive a logger with the `context_id` read from the configured
    /// correlation header; absent means empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] before [`initialize`](Self::initialize).
    pub fn logger_from_headers(&self, headers: &HeaderMap) -> Result<DerivedLogger, Error> {
        Ok(self.get()?.from_headers(headers))
    }

    /// Derive a logger with the `trace_id` from the request's [`TraceContext`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] before [`initialize`](Self::initialize),
    /// and [`Error::MissingTraceContext`] when the request carries no context.
    pub fn logger_from_request(&self, req: &HttpRequest) -> Result<DerivedLogger, Error> {
        self.get()?.from_request(req)
    }
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
