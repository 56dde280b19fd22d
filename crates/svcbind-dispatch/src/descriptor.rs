//! Registration-time descriptions of bound methods.

use std::fmt;

use axum::http::Method;
use serde::Serialize;
use serde_json::Value;
use svcbind_binding::ArgumentShape;

/// Default cap on a buffered request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Route identity: verb plus path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: Method,
    pub path: String,
}

impl RouteKey {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// How many outputs the callable's contract has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultArity {
    /// Declared error only; the method writes its own response.
    One,
    /// Data plus declared error.
    Two,
}

impl ResultArity {
    pub fn count(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

/// Per-route switches fixed at registration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteOptions {
    pub bypass_request_body: bool,
    pub bypass_response_body: bool,
    pub file_upload: bool,
    /// JSON schema the bound record must satisfy.
    pub schema: Option<Value>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bypass_request_body(mut self) -> Self {
        self.bypass_request_body = true;
        self
    }

    pub fn bypass_response_body(mut self) -> Self {
        self.bypass_response_body = true;
        self
    }

    pub fn file_upload(mut self) -> Self {
        self.file_upload = true;
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Router-wide limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub max_body_bytes: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Everything known about a bound method once it passed registration.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub route: RouteKey,
    pub argument_type: &'static str,
    pub argument_shape: ArgumentShape,
    pub result_arity: ResultArity,
    pub result_type: &'static str,
    pub options: RouteOptions,
}
