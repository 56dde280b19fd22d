//! Execution-context carrier handed to every bound method.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use tokio::time::Instant;

/// Request-scoped deadline set by an outer layer. The dispatcher forwards it
/// into [`MethodContext`] untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDeadline(pub Instant);

#[derive(Debug)]
enum ResponseBody {
    Buffered(Vec<u8>),
    Streamed(Body),
}

/// Everything a method may observe about its request and everything it may
/// set on its response when it writes the response itself.
#[derive(Debug)]
pub struct MethodContext {
    deadline: Option<Instant>,
    remote_addr: Option<SocketAddr>,
    request_headers: HeaderMap,
    request_body: Option<Body>,
    status: StatusCode,
    response_headers: HeaderMap,
    response_body: ResponseBody,
}

impl MethodContext {
    pub fn new(request_headers: HeaderMap) -> Self {
        Self {
            deadline: None,
            remote_addr: None,
            request_headers,
            request_body: None,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: ResponseBody::Buffered(Vec::new()),
        }
    }

    pub fn with_remote_addr(mut self, remote_addr: Option<SocketAddr>) -> Self {
        self.remote_addr = remote_addr;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<RequestDeadline>) -> Self {
        self.deadline = deadline.map(|deadline| deadline.0);
        self
    }

    pub fn with_request_body(mut self, body: Option<Body>) -> Self {
        self.request_body = body;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the transport deadline, `None` when no deadline is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|remaining| remaining.is_zero())
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// The unread request body. Present only when the route bypasses body
    /// decoding or the body's media type is not one the binder understands.
    pub fn take_request_body(&mut self) -> Option<Body> {
        self.request_body.take()
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Appends to the buffered response body. A previously installed stream is
    /// discarded.
    pub fn write(&mut self, bytes: impl AsRef<[u8]>) {
        if let ResponseBody::Buffered(buffer) = &mut self.response_body {
            buffer.extend_from_slice(bytes.as_ref());
            return;
        }
        self.response_body = ResponseBody::Buffered(bytes.as_ref().to_vec());
    }

    /// Replaces the response body with a stream the transport drains after the
    /// method returns.
    pub fn stream(&mut self, body: Body) {
        self.response_body = ResponseBody::Streamed(body);
    }

    /// Builds the response the method wrote for itself.
    pub fn into_response(self) -> Response {
        let body = match self.response_body {
            ResponseBody::Buffered(buffer) => Body::from(buffer),
            ResponseBody::Streamed(body) => body,
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.response_headers;
        response
    }

    /// Response headers as they stand, leaving the body behind. Used when the
    /// dispatcher answers instead of the method.
    pub fn into_response_headers(self) -> HeaderMap {
        self.response_headers
    }
}
