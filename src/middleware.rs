//! Request instrumentation for the actix-web handler chain.

use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::{web, HttpMessage};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{Level, LoggerConfig};
use crate::error::Error;
use crate::logger::{BaseLogger, Labels, TraceContext, CONTEXT_ID_KEY, TRACE_ID_KEY};

/// Placeholder recorded for header values that are not valid UTF-8.
const BAD_UTF8: &str = "<bad_utf8>";

#[derive(Debug)]
struct Inner {
    logger: BaseLogger,
    correlation_header: HeaderName,
    ignored_paths: HashSet<String>,
    inject_trace_context: bool,
}

/// Middleware factory that logs one structured record per request.
///
/// The middleware owns its own [`BaseLogger`], separate from any application
/// registry, with a severity-less schema: each completed request produces a
/// single record with an empty message slot and all data carried as fields
/// (`client_ip`, `method`, `request_headers`, `url`, `uri`, `querystring`,
/// the correlation id, `latency` in microseconds, `status`,
/// `response_headers`).
///
/// The correlation id is read from the configured header; when the header is
/// missing or empty, a fresh id is generated and written back onto the
/// inbound request, so handlers and downstream calls observe the same id the
/// record carries. Paths listed in `ignored_paths` are passed through with no
/// record and no header mutation at all.
///
/// Build it once and clone it into the server factory:
///
/// ```no_run
/// use actix_web::{App, HttpServer};
/// use svclog::{LoggerConfig, RequestLogger};
///
/// # #[actix_web::main]
/// # async fn main() -> std::io::Result<()> {
/// let config = LoggerConfig::default().with_ignored_path("/health");
/// let request_logger = RequestLogger::new("checkout", config)
///     .expect("request logger configuration is invalid");
///
/// HttpServer::new(move || App::new().wrap(request_logger.clone()))
///     .bind(("127.0.0.1", 8080))?
///     .run()
///     .await
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RequestLogger {
    inner: Arc<Inner>,
}

impl RequestLogger {
    /// Build the middleware and its logger from a configuration.
    ///
    /// # Errors
    ///
    /// Fails if the output paths cannot be resolved into sinks or the
    /// correlation header is not a valid header name. Both are startup-time
    /// failures; a process that cannot log its requests should not serve.
    pub fn new(namespace: &str, config: LoggerConfig) -> Result<Self, Error> {
        let config = config.normalized();
        let logger = BaseLogger::new(namespace, Level::Info, &config)?;
        let correlation_header = HeaderName::try_from(config.correlation_header.as_str())
            .map_err(|_| Error::InvalidCorrelationHeader(config.correlation_header.clone()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                logger,
                correlation_header,
                ignored_paths: config.ignored_paths,
                inject_trace_context: config.inject_trace_context,
            }),
        })
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = RequestLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware {
            service,
            inner: Arc::clone(&self.inner),
        }))
    }
}

/// The per-worker service wrapper built by [`RequestLogger`].
pub struct RequestLoggerMiddleware<S> {
    service: S,
    inner: Arc<Inner>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        // Ignored paths see no side effects at all: no timer, no id
        // resolution (which would mutate the headers), no record.
        if self.inner.ignored_paths.contains(req.path()) {
            return Box::pin(self.service.call(req));
        }

        let start = Instant::now();
        let context_id = resolve_context_id(&mut req, &self.inner.correlation_header);
        if self.inner.inject_trace_context {
            req.extensions_mut().insert(TraceContext(context_id.clone()));
        }

        let mut fields = pre_capture(&req);
        let id_key = if self.inner.inject_trace_context {
            TRACE_ID_KEY
        } else {
            CONTEXT_ID_KEY
        };
        fields.insert(id_key.to_owned(), Value::String(context_id));

        let inner = Arc::clone(&self.inner);
        let fut = self.service.call(req);
        Box::pin(async move {
            // Handler errors are already rendered into responses by the
            // inner service, so they still get a record below. An Err here
            // means the chain unwound past us, and no record is emitted.
            let res = fut.await?;

            let latency = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
            fields.insert("latency".to_owned(), latency.into());
            fields.insert("status".to_owned(), res.status().as_u16().into());
            fields.insert(
                "response_headers".to_owned(),
                Value::Object(first_header_values(res.headers())),
            );
            inner.logger.emit_event(fields);
            Ok(res)
        })
    }
}

/// Read the correlation id from `header`, or generate one and write it back
/// onto the request so the rest of the lifecycle observes a consistent id.
/// Empty and non-UTF-8 values count as absent.
fn resolve_context_id(req: &mut ServiceRequest, header: &HeaderName) -> String {
    let existing = req
        .headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned);
    match existing {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                req.headers_mut().insert(header.clone(), value);
            }
            id
        }
    }
}

fn pre_capture(req: &ServiceRequest) -> Labels {
    let mut fields = Labels::new();
    {
        let conn = req.connection_info();
        fields.insert(
            "client_ip".to_owned(),
            conn.realip_remote_addr().unwrap_or_default().into(),
        );
        fields.insert(
            "url".to_owned(),
            format!("{}{}", conn.host(), req.path()).into(),
        );
    }
    fields.insert("method".to_owned(), req.method().as_str().into());
    fields.insert(
        "request_headers".to_owned(),
        Value::Object(first_header_values(req.headers())),
    );
    fields.insert("uri".to_owned(), req.path().into());
    fields.insert(
        "querystring".to_owned(),
        Value::Object(query_params(req.query_string())),
    );
    fields
}

/// Flatten a header map to one value per name. Repeated names keep their
/// first value only; the rest are dropped. Names use the lowercase canonical
/// form.
fn first_header_values(headers: &HeaderMap) -> Labels {
    let mut map = Labels::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_owned())
            .or_insert_with(|| value.to_str().unwrap_or(BAD_UTF8).into());
    }
    map
}

/// Parse a query string to one decoded value per parameter name, first value
/// wins. Unparseable query strings capture as an empty object.
fn query_params(query: &str) -> Labels {
    let mut map = Labels::new();
    let parsed = web::Query::<Vec<(String, String)>>::from_query(query)
        .map(web::Query::into_inner)
        .unwrap_or_default();
    for (key, value) in parsed {
        map.entry(key).or_insert_with(|| value.into());
    }
    map
}
