//! Error types for method registration, argument binding and invocation.

use serde::Serialize;
use thiserror::Error;

/// Raised once while routes are being registered. A router that fails
/// registration never serves traffic.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("route {route}: file upload mode requires an UploadedFiles argument, got {argument}")]
    FileUploadArgument { route: String, argument: &'static str },
    #[error("route {route}: argument {argument} is a file list but file upload mode is off")]
    FileListWithoutUpload { route: String, argument: &'static str },
    #[error("invalid route path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("unsupported verb for route {route}")]
    UnsupportedVerb { route: String },
    #[error("route already registered: {route}")]
    DuplicateRoute { route: String },
    #[error("route {route}: invalid validation schema: {reason}")]
    InvalidSchema { route: String, reason: String },
}

/// Anything that prevents a request from producing a bound argument. Always
/// answered with a 400-class envelope; the method is never invoked.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("request body: {0}")]
    Body(String),
    #[error("argument: {0}")]
    Decode(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("multipart: {0}")]
    Multipart(String),
}

/// A panic captured at the invocation boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("method panicked: {message}")]
pub struct SandboxFault {
    pub message: String,
    pub trace: String,
}

/// A registered argument or result type that could not be serialized. This is
/// a defect in the method's types, not a client error.
#[derive(Debug, Error)]
#[error("{what} serialization failed: {source}")]
pub struct SerializationFault {
    pub what: &'static str,
    #[source]
    pub source: serde_json::Error,
}

impl SerializationFault {
    pub fn new(what: &'static str, source: serde_json::Error) -> Self {
        Self { what, source }
    }
}
