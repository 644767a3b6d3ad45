use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{get, test, HttpRequest, HttpResponse, Responder, ResponseError};
use pretty_assertions::assert_eq;
use serde_json::json;
use svclog::{Level, LoggerRegistry, RequestLogger};

use crate::utils::{label, memory_config, single_record};

#[get("/ping")]
async fn ping() -> impl Responder {
    "pong"
}

#[get("/echo")]
async fn echo_correlation(req: HttpRequest) -> impl Responder {
    req.headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none")
        .to_owned()
}

#[get("/test")]
async fn ignored(req: HttpRequest) -> impl Responder {
    match req.headers().get("x-request-id") {
        Some(_) => "mutated".to_owned(),
        None => "untouched".to_owned(),
    }
}

#[get("/slow")]
async fn slow() -> impl Responder {
    actix_web::rt::time::sleep(Duration::from_millis(5)).await;
    "done"
}

#[derive(Debug)]
struct TestError;

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "test error")
    }
}

impl ResponseError for TestError {}

#[get("/fail")]
async fn failing() -> Result<HttpResponse, TestError> {
    Err(TestError)
}

#[actix_rt::test]
async fn logs_one_record_per_request() {
    let (sink, config) = memory_config("mw-ping");
    let middleware = RequestLogger::new("http", config).expect("request logger");
    let app = test::init_service(actix_web::App::new().wrap(middleware).service(ping)).await;

    let req = test::TestRequest::with_uri("/ping?sort=created").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let record = single_record(&sink);
    assert_eq!(record["uri"], "/ping");
    assert_eq!(record["method"], "GET");
    assert_eq!(record["querystring"], json!({"sort": "created"}));
    assert_eq!(record["status"], json!(200));
    assert_eq!(record["namespace"], "http");
    assert_eq!(record["environment"], "production");

    let context_id = record["context_id"].as_str().expect("context_id");
    assert!(!context_id.is_empty(), "should have a generated id");

    assert!(record["latency"].as_u64().is_some(), "latency in microseconds");
    assert!(record["request_headers"].is_object());
    assert!(record["response_headers"].is_object());
    assert!(
        record["url"].as_str().expect("url").ends_with("/ping"),
        "url is host plus path"
    );

    // Request records are events: no severity, no message.
    assert!(record.get("severity").is_none());
    assert!(record.get("text_payload").is_none());
}

#[actix_rt::test]
async fn ignored_paths_emit_nothing_and_mutate_nothing() {
    let (sink, config) = memory_config("mw-ignored");
    let middleware =
        RequestLogger::new("http", config.with_ignored_path("/test")).expect("request logger");
    let app = test::init_service(actix_web::App::new().wrap(middleware).service(ignored)).await;

    let body = test::call_and_read_body(&app, test::TestRequest::with_uri("/test").to_request())
        .await;
    assert_eq!(body, "untouched", "no correlation header is written back");
    assert!(sink.records().is_empty(), "ignored paths emit no records");
}

#[actix_rt::test]
async fn present_correlation_headers_are_preserved() {
    let (sink, config) = memory_config("mw-present");
    let middleware = RequestLogger::new("http", config).expect("request logger");
    let app =
        test::init_service(actix_web::App::new().wrap(middleware).service(echo_correlation)).await;

    let req = test::TestRequest::with_uri("/echo")
        .append_header(("x-request-id", "abc-123"))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;

    assert_eq!(body, "abc-123", "the inbound header is left unmodified");
    assert_eq!(single_record(&sink)["context_id"], "abc-123");
}

#[actix_rt::test]
async fn absent_correlation_headers_are_generated_and_written_back() {
    let (sink, config) = memory_config("mw-absent");
    let middleware = RequestLogger::new("http", config).expect("request logger");
    let app =
        test::init_service(actix_web::App::new().wrap(middleware).service(echo_correlation)).await;

    let body = test::call_and_read_body(&app, test::TestRequest::with_uri("/echo").to_request())
        .await;
    let seen_by_handler = String::from_utf8(body.to_vec()).expect("utf-8 body");

    assert_ne!(seen_by_handler, "none", "the handler observes the written-back id");
    let record = single_record(&sink);
    let context_id = record["context_id"].as_str().expect("context_id");
    assert!(!context_id.is_empty());
    assert_eq!(
        context_id, seen_by_handler,
        "handler and record share one id"
    );
    assert_eq!(
        record["request_headers"]["x-request-id"], context_id,
        "captured headers include the resolved id"
    );
}

#[actix_rt::test]
async fn repeated_headers_keep_their_first_value() {
    let (sink, config) = memory_config("mw-multi");
    let middleware = RequestLogger::new("http", config).expect("request logger");
    let app = test::init_service(actix_web::App::new().wrap(middleware).service(ping)).await;

    let req = test::TestRequest::with_uri("/ping")
        .append_header(("accept", "text/html"))
        .append_header(("accept", "application/json"))
        .to_request();
    test::call_service(&app, req).await;

    let record = single_record(&sink);
    assert_eq!(record["request_headers"]["accept"], "text/html");
}

#[actix_rt::test]
async fn latency_reflects_handler_time() {
    let (sink, config) = memory_config("mw-latency");
    let middleware = RequestLogger::new("http", config).expect("request logger");
    let app = test::init_service(actix_web::App::new().wrap(middleware).service(slow)).await;

    test::call_service(&app, test::TestRequest::with_uri("/slow").to_request()).await;

    let latency = single_record(&sink)["latency"]
        .as_u64()
        .expect("latency in microseconds");
    assert!(
        latency >= 5_000,
        "a 5ms handler should measure at least 5000us, got {latency}"
    );
}

#[actix_rt::test]
async fn error_responses_are_still_logged_with_their_status() {
    let (sink, config) = memory_config("mw-error");
    let middleware = RequestLogger::new("http", config).expect("request logger");
    let app = test::init_service(actix_web::App::new().wrap(middleware).service(failing)).await;

    let res = test::call_service(&app, test::TestRequest::with_uri("/fail").to_request()).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(single_record(&sink)["status"], json!(500));
}

static TRACE_REGISTRY: LoggerRegistry = LoggerRegistry::new();

#[get("/traced")]
async fn traced(req: HttpRequest) -> impl Responder {
    let log = TRACE_REGISTRY
        .logger_from_request(&req)
        .expect("middleware injected the trace context");
    svclog::info!(log, "handled");
    "ok"
}

#[actix_rt::test]
async fn trace_injection_threads_one_id_through_handler_and_record() {
    let (app_sink, app_config) = memory_config("mw-trace-app");
    TRACE_REGISTRY
        .initialize("checkout", Level::Info, app_config)
        .expect("initialize application registry");

    let (request_sink, request_config) = memory_config("mw-trace-req");
    let middleware = RequestLogger::new("http", request_config.with_trace_injection(true))
        .expect("request logger");
    let app = test::init_service(actix_web::App::new().wrap(middleware).service(traced)).await;

    test::call_service(&app, test::TestRequest::with_uri("/traced").to_request()).await;

    let request_record = single_record(&request_sink);
    let trace_id = request_record["trace_id"].as_str().expect("trace_id");
    assert!(!trace_id.is_empty());
    assert!(
        request_record.get("context_id").is_none(),
        "trace-injection mode uses the trace_id key"
    );

    let app_record = single_record(&app_sink);
    assert_eq!(
        label(&app_record, "trace_id"),
        trace_id,
        "handler logs share the request's id"
    );
}
