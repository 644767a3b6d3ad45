//! # svclog
//!
//! Structured JSON logging for server processes, plus an
//! [actix-web](https://actix.rs/) middleware that logs one record per
//! inbound request.
//!
//! Every record carries a fixed set of static fields (namespace,
//! environment, and `resource_labels` with the hostname and pid) alongside
//! a correlation id that ties together all the records produced while
//! handling one logical request.
//!
//! ## Application logger
//!
//! A process builds its base logger exactly once through a
//! [`LoggerRegistry`], then derives a cheap per-call logger wherever it
//! needs one. The derivation chooses where the correlation id comes from:
//! freshly generated ([`LoggerRegistry::logger`]), supplied by the caller
//! ([`LoggerRegistry::logger_with_id`]), read from the correlation header
//! ([`LoggerRegistry::logger_from_headers`]), or taken from the request's
//! [`TraceContext`] ([`LoggerRegistry::logger_from_request`]).
//!
//! ```
//! use svclog::{Level, LoggerConfig, LoggerRegistry};
//!
//! static LOGGING: LoggerRegistry = LoggerRegistry::new();
//!
//! # fn main() -> Result<(), svclog::Error> {
//! LOGGING.initialize("checkout", Level::Info, LoggerConfig::default())?;
//!
//! let log = LOGGING.logger()?.with_field("customer", "c-117");
//! svclog::info!(log, "order accepted"; "amount" => 42);
//! # Ok(())
//! # }
//! ```
//!
//! Records are JSON lines. The example above emits (reformatted):
//!
//! ```json
//! {
//!   "timestamp": 1735689600000,
//!   "severity": "INFO",
//!   "source_function": "checkout::orders::accept",
//!   "source_caller": "src/orders.rs:41",
//!   "text_payload": "order accepted",
//!   "namespace": "checkout",
//!   "environment": "production",
//!   "resource_labels": {"hostname": "web-1", "pid": 4242},
//!   "labels": {"context_id": "…", "customer": "c-117", "amount": 42}
//! }
//! ```
//!
//! ## Request middleware
//!
//! [`RequestLogger`] wraps the handler chain and emits a single
//! severity-less record per request with timing, header, and query
//! information. Create it outside the `HttpServer::new` closure and clone it
//! in, so every worker shares one logger:
//!
//! ```no_run
//! use actix_web::{App, HttpServer};
//! use svclog::{LoggerConfig, RequestLogger};
//!
//! # #[actix_web::main]
//! # async fn main() -> std::io::Result<()> {
//! let request_logger = RequestLogger::new("checkout", LoggerConfig::default())
//!     .expect("request logger configuration is invalid");
//!
//! HttpServer::new(move || App::new().wrap(request_logger.clone()))
//!     .bind(("127.0.0.1", 8080))?
//!     .run()
//!     .await
//! # }
//! ```
//!
//! Requests whose path is listed in
//! [`LoggerConfig::ignored_paths`](LoggerConfig) produce no record and are
//! passed through completely untouched.
//!
//! ## Testing sinks
//!
//! Output paths are URI-like: `stdout`, `stderr`, or `memory://<name>` for a
//! buffer registered with [`MemorySink::register`], which tests can read
//! back as parsed JSON records.

#![warn(missing_docs)]

mod config;
mod error;
mod logger;
mod middleware;
mod sink;

pub use crate::config::{Level, LoggerConfig};
pub use crate::error::Error;
pub use crate::logger::{BaseLogger, DerivedLogger, Labels, LoggerRegistry, TraceContext};
pub use crate::middleware::{RequestLogger, RequestLoggerMiddleware};
pub use crate::sink::MemorySink;

/// Re-exported for use in [`Labels`] and the logging macros.
pub use serde_json::Value;

/// Full path of the enclosing function, for the `source_function` field.
#[doc(hidden)]
#[macro_export]
macro_rules! __function_path {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}

/// Log through a [`DerivedLogger`] at an explicit [`Level`], with optional
/// `"key" => value` fields merged into `labels` for this record.
///
/// ```
/// # use svclog::{Level, LoggerConfig, LoggerRegistry};
/// # static LOGGING: LoggerRegistry = LoggerRegistry::new();
/// # fn main() -> Result<(), svclog::Error> {
/// # LOGGING.initialize("docs", Level::Info, LoggerConfig::default())?;
/// let log = LOGGING.logger()?;
/// svclog::log!(log, Level::Warn, "cache miss"; "key" => "sessions/91");
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $message:expr $(,)?) => {
        $logger.log($level, $message, Some($crate::__function_path!()), $crate::Labels::new())
    };
    ($logger:expr, $level:expr, $message:expr; $($key:expr => $value:expr),+ $(,)?) => {{
        let mut labels = $crate::Labels::new();
        $(
            labels.insert($key.into(), $crate::Value::from($value));
        )+
        $logger.log($level, $message, Some($crate::__function_path!()), labels)
    }};
}

/// Log at DEBUG. See [`log!`].
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::Level::Debug, $($rest)+)
    };
}

/// Log at INFO. See [`log!`].
#[macro_export]
macro_rules! info {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::Level::Info, $($rest)+)
    };
}

/// Log at WARN. See [`log!`].
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::Level::Warn, $($rest)+)
    };
}

/// Log at ERROR, with a stacktrace. See [`log!`].
#[macro_export]
macro_rules! error {
    ($logger:expr, $($rest:tt)+) => {
        $crate::log!($logger, $crate::Level::Error, $($rest)+)
    };
}
