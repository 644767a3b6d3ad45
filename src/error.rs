use thiserror::Error;

/// Errors surfaced by logger construction and derivation.
///
/// Runtime emission failures never appear here: once a logger is built,
/// writing a record cannot fail the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// A logger was requested from a registry that has not been initialized.
    #[error("logger is not initialized; call `LoggerRegistry::initialize` first")]
    Uninitialized,

    /// The configured output path could not be turned into a sink.
    #[error("cannot construct log sink for `{path}`: {reason}")]
    SinkConstruction {
        /// The offending output path.
        path: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The configured correlation header is not a valid HTTP header name.
    #[error("`{0}` is not a valid correlation header name")]
    InvalidCorrelationHeader(String),

    /// No trace context was present on the request. The middleware only
    /// places one when `inject_trace_context` is enabled.
    #[error("no trace context present on the request; was the request logger built with `inject_trace_context`?")]
    MissingTraceContext,
}
