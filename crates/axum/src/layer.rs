//! Access-log tower layer
//!
//! Applied with `Router::layer`, which runs after routing, so the matched
//! route pattern is available from request extensions even for the
//! fallback (where it is simply absent).

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath},
    http::{header, response, HeaderMap, Request, Response},
};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use parqlog_pipeline::{AccessRow, HeaderSnapshot, Logger, RowSender};

use crate::body::{CountingBody, RowFinisher};

/// Handler error carried to the access log via response extensions
///
/// Axum handlers are infallible at the type level; a handler or error
/// layer that wants the failure recorded inserts this into the response.
#[derive(Debug, Clone)]
pub struct CapturedError(pub String);

/// Layer that records one access row per completed request
#[derive(Clone)]
pub struct AccessLogLayer {
    sender: RowSender,
}

impl AccessLogLayer {
    /// Create a layer feeding the given pipeline
    pub fn new(logger: &Logger) -> Self {
        Self {
            sender: logger.sender(),
        }
    }

    /// Create a layer from a detached sender handle
    pub fn from_sender(sender: RowSender) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            sender: self.sender.clone(),
        }
    }
}

/// Service produced by [`AccessLogLayer`]
#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
    sender: RowSender,
}

impl<S> Service<Request<Body>> for AccessLogService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let sender = self.sender.clone();
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let started_at = Instant::now();
            let start_time = Utc::now();
            let pending = PendingRow::capture(&req);

            let response = inner.call(req).await?;

            let (parts, body) = response.into_parts();
            let row = pending.into_row(start_time, &parts);
            let finisher = RowFinisher::new(sender, started_at, row);
            let body = Body::new(CountingBody::new(body, finisher));
            Ok(Response::from_parts(parts, body))
        })
    }
}

/// Request-side fields, captured before the request is consumed
struct PendingRow {
    protocol: String,
    remote_addr: String,
    host: String,
    method: String,
    url: String,
    route_pattern: String,
    referer: String,
    user_agent: String,
    request_size: i64,
    request_headers: HeaderSnapshot,
}

impl PendingRow {
    fn capture(req: &Request<Body>) -> Self {
        let headers = req.headers();
        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.to_string())
            .unwrap_or_default();
        let route_pattern = req
            .extensions()
            .get::<MatchedPath>()
            .map(|path| path.as_str().to_string())
            .unwrap_or_default();
        let host = req
            .uri()
            .authority()
            .map(|authority| authority.to_string())
            .or_else(|| header_string(headers, header::HOST))
            .unwrap_or_default();
        let url = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| req.uri().to_string());
        let request_size = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(-1);

        Self {
            protocol: format!("{:?}", req.version()),
            remote_addr,
            host,
            method: req.method().to_string(),
            url,
            route_pattern,
            referer: header_string(headers, header::REFERER).unwrap_or_default(),
            user_agent: header_string(headers, header::USER_AGENT).unwrap_or_default(),
            request_size,
            request_headers: snapshot_headers(headers),
        }
    }

    fn into_row(self, start_time: DateTime<Utc>, parts: &response::Parts) -> AccessRow {
        // Latency and response size are filled in when the body finishes.
        AccessRow {
            start_time,
            latency: Duration::ZERO,
            protocol: self.protocol,
            remote_addr: self.remote_addr,
            host: self.host,
            method: self.method,
            url: self.url,
            route_pattern: self.route_pattern,
            referer: self.referer,
            user_agent: self.user_agent,
            status: parts.status.as_u16(),
            request_size: self.request_size,
            response_size: 0,
            request_headers: self.request_headers,
            response_headers: snapshot_headers(&parts.headers),
            error: parts
                .extensions
                .get::<CapturedError>()
                .map(|captured| captured.0.clone()),
        }
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Group header values by name, preserving first-seen order
fn snapshot_headers(headers: &HeaderMap) -> HeaderSnapshot {
    let mut snapshot: HeaderSnapshot = Vec::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match snapshot
            .iter_mut()
            .find(|(seen, _)| seen.as_str() == name.as_str())
        {
            Some((_, values)) => values.push(value),
            None => snapshot.push((name.as_str().to_string(), vec![value])),
        }
    }
    snapshot
}
