//! Middleware integration tests
//!
//! Drive whole requests through an axum `Router` with the layer attached
//! and observe the emitted rows through an in-memory sink.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tower::ServiceExt;

use parqlog_pipeline::{
    AccessRow, ClosedSegment, ColumnarSink, Logger, LoggerConfig, SinkError, SinkFactory,
};

use crate::{AccessLogLayer, CapturedError};

// =============================================================================
// In-memory sink for observing rows
// =============================================================================

#[derive(Default)]
struct CollectState {
    rows: Mutex<Vec<AccessRow>>,
}

struct CollectFactory(Arc<CollectState>);

impl SinkFactory for CollectFactory {
    fn open(&self) -> Result<Box<dyn ColumnarSink>, SinkError> {
        Ok(Box::new(CollectSink {
            state: Arc::clone(&self.0),
            rows: 0,
        }))
    }
}

struct CollectSink {
    state: Arc<CollectState>,
    rows: u64,
}

impl ColumnarSink for CollectSink {
    fn write(&mut self, row: AccessRow) -> Result<(), SinkError> {
        self.rows += 1;
        self.state.rows.lock().push(row);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<Box<dyn ClosedSegment>, SinkError> {
        Ok(Box::new(CollectSegment { rows: self.rows }))
    }
}

struct CollectSegment {
    rows: u64,
}

impl ClosedSegment for CollectSegment {
    fn row_count(&self) -> u64 {
        self.rows
    }

    fn export_to(&mut self, _destination: &Path) -> Result<u64, SinkError> {
        Ok(0)
    }
}

fn collecting_logger() -> (Logger, Arc<CollectState>) {
    let state = Arc::new(CollectState::default());
    let logger = Logger::with_sink_factory(
        LoggerConfig::default(),
        Arc::new(CollectFactory(Arc::clone(&state))),
    )
    .unwrap();
    (logger, state)
}

async fn wait_rows(state: &CollectState, n: usize) -> Vec<AccessRow> {
    for _ in 0..500 {
        {
            let rows = state.rows.lock();
            if rows.len() >= n {
                return rows.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("timed out waiting for {n} rows");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_captures_request_and_response_fields() {
    let (logger, state) = collecting_logger();
    let app = Router::new()
        .route("/user/{id}", get(|| async { "hello from user 42" }))
        .layer(AccessLogLayer::new(&logger));

    let request = Request::builder()
        .uri("/user/42?verbose=1")
        .header(header::HOST, "example.com")
        .header(header::USER_AGENT, "layer-test/1.0")
        .header(header::REFERER, "https://example.com/")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();

    let rows = wait_rows(&state, 1).await;
    let row = &rows[0];
    assert_eq!(row.method, "GET");
    assert_eq!(row.url, "/user/42?verbose=1");
    assert_eq!(row.route_pattern, "/user/{id}");
    assert_eq!(row.protocol, "HTTP/1.1");
    assert_eq!(row.host, "example.com");
    assert_eq!(row.user_agent, "layer-test/1.0");
    assert_eq!(row.referer, "https://example.com/");
    assert_eq!(row.status, 200);
    assert_eq!(row.request_size, -1);
    assert_eq!(row.response_size, body.len() as i64);
    assert!(row.error.is_none());

    // Response headers include what axum set for the string body.
    assert!(row
        .response_headers
        .iter()
        .any(|(name, _)| name == "content-type"));

    logger.shutdown().await;
}

#[tokio::test]
async fn test_multi_value_headers_are_grouped() {
    let (logger, state) = collecting_logger();
    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .layer(AccessLogLayer::new(&logger));

    let request = Request::builder()
        .uri("/")
        .header(header::ACCEPT, "text/html")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    response.into_body().collect().await.unwrap();

    let rows = wait_rows(&state, 1).await;
    let accept = rows[0]
        .request_headers
        .iter()
        .find(|(name, _)| name == "accept")
        .expect("accept header recorded");
    assert_eq!(accept.1, vec!["text/html", "application/json"]);

    logger.shutdown().await;
}

#[tokio::test]
async fn test_remote_addr_from_connect_info() {
    let (logger, state) = collecting_logger();
    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .layer(AccessLogLayer::new(&logger));

    let request = Request::builder()
        .uri("/")
        .extension(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4321))))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    response.into_body().collect().await.unwrap();

    let rows = wait_rows(&state, 1).await;
    assert_eq!(rows[0].remote_addr, "10.0.0.1:4321");

    logger.shutdown().await;
}

#[tokio::test]
async fn test_handler_error_recorded_via_extension() {
    let (logger, state) = collecting_logger();
    let app = Router::new()
        .route(
            "/flaky",
            get(|| async {
                let mut response =
                    (StatusCode::BAD_GATEWAY, "upstream timed out").into_response();
                response
                    .extensions_mut()
                    .insert(CapturedError("upstream timed out".to_string()));
                response
            }),
        )
        .layer(AccessLogLayer::new(&logger));

    let request = Request::builder()
        .uri("/flaky")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    response.into_body().collect().await.unwrap();

    let rows = wait_rows(&state, 1).await;
    assert_eq!(rows[0].status, 502);
    assert_eq!(rows[0].error.as_deref(), Some("upstream timed out"));

    logger.shutdown().await;
}

#[tokio::test]
async fn test_unmatched_route_is_still_logged() {
    let (logger, state) = collecting_logger();
    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .layer(AccessLogLayer::new(&logger));

    let request = Request::builder()
        .uri("/no/such/route")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    response.into_body().collect().await.unwrap();

    let rows = wait_rows(&state, 1).await;
    assert_eq!(rows[0].status, 404);
    assert_eq!(rows[0].url, "/no/such/route");
    assert!(rows[0].route_pattern.is_empty());

    logger.shutdown().await;
}

#[tokio::test]
async fn test_streamed_response_size_counted() {
    let (logger, state) = collecting_logger();
    let app = Router::new()
        .route(
            "/stream",
            get(|| async {
                let chunks = futures_util::stream::iter(vec![
                    Ok::<_, Infallible>("chunk-one"),
                    Ok("chunk-two"),
                ]);
                Body::from_stream(chunks)
            }),
        )
        .layer(AccessLogLayer::new(&logger));

    let request = Request::builder()
        .uri("/stream")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.len(), 18);

    let rows = wait_rows(&state, 1).await;
    assert_eq!(rows[0].response_size, 18);

    logger.shutdown().await;
}

#[tokio::test]
async fn test_latency_covers_handler_time() {
    let (logger, state) = collecting_logger();
    let app = Router::new()
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                "done"
            }),
        )
        .layer(AccessLogLayer::new(&logger));

    let request = Request::builder().uri("/slow").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    response.into_body().collect().await.unwrap();

    let rows = wait_rows(&state, 1).await;
    assert!(rows[0].latency >= Duration::from_millis(10));

    logger.shutdown().await;
}

#[tokio::test]
async fn test_request_size_from_content_length() {
    let (logger, state) = collecting_logger();
    let app = Router::new()
        .route("/submit", axum::routing::post(|| async { "accepted" }))
        .layer(AccessLogLayer::new(&logger));

    let request = Request::builder()
        .method("POST")
        .uri("/submit")
        .header(header::CONTENT_LENGTH, "11")
        .body(Body::from("hello world"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    response.into_body().collect().await.unwrap();

    let rows = wait_rows(&state, 1).await;
    assert_eq!(rows[0].method, "POST");
    assert_eq!(rows[0].request_size, 11);

    logger.shutdown().await;
}
