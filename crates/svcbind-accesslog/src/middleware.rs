//! The axum middleware that opens, fills and emits one row per request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use uuid::Uuid;

use crate::row::{
    AccessLogRow, BEGIN_TIME, DURATION, HTTP_METHOD, REMOTE, REQUEST_ID, STATUS, URI,
};
use crate::sink::{AccessLogSink, TracingSink};

const BEGIN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Response header echoing the row's request id.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Middleware state. Install with
/// `axum::middleware::from_fn_with_state(AccessLog::tracing(), access_log)`.
#[derive(Clone)]
pub struct AccessLog {
    sink: Arc<dyn AccessLogSink>,
    logged_headers: Arc<[HeaderName]>,
}

impl AccessLog {
    pub fn new(sink: impl AccessLogSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            logged_headers: Arc::from([]),
        }
    }

    pub fn tracing() -> Self {
        Self::new(TracingSink)
    }

    /// Request headers copied into the row under their lowercase names.
    pub fn log_headers(mut self, headers: impl IntoIterator<Item = HeaderName>) -> Self {
        self.logged_headers = headers.into_iter().collect();
        self
    }
}

impl std::fmt::Debug for AccessLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLog")
            .field("logged_headers", &self.logged_headers)
            .finish_non_exhaustive()
    }
}

pub async fn access_log(State(log): State<AccessLog>, mut request: Request, next: Next) -> Response {
    let started_at = Utc::now();
    let clock = Instant::now();

    let row = AccessLogRow::new();
    let request_id = Uuid::new_v4().to_string();
    row.set(REQUEST_ID, request_id.as_str());
    for name in log.logged_headers.iter() {
        if let Some(value) = request.headers().get(name).and_then(|v| v.to_str().ok()) {
            row.set(name.as_str(), value);
        }
    }

    let http_method = request.method().to_string();
    let uri = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_owned(), |pq| pq.as_str().to_owned());
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    request.extensions_mut().insert(row.clone());

    let mut response = next.run(request).await;
    let status = response.status();

    row.set(BEGIN_TIME, started_at.format(BEGIN_TIME_FORMAT).to_string());
    row.set(STATUS, status.as_u16().to_string());
    row.set(DURATION, clock.elapsed().as_secs_f64().to_string());
    row.set(REMOTE, remote);
    row.set(HTTP_METHOD, http_method);
    row.set(URI, uri);
    log.sink.emit(status, &row);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}
