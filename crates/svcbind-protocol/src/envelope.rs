//! Canonical response envelope.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SUCCESS: &str = "success";
pub const PARSE_ARGUMENT_FAILED: &str = "parse argument failed";
pub const METHOD_FAULTED: &str = "method faulted";
pub const METHOD_REPORTED_ERROR: &str = "method reported error";
pub const RESPONSE_SERIALIZATION_FAILED: &str = "response serialization failed";
pub const ARGUMENT_SERIALIZATION_FAILED: &str = "argument serialization failed";

/// The `{code, msg, data}` body used for faults, declared errors, binding
/// failures and any response a method wants to emit with its own status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub code: u16,
    pub msg: String,
    pub data: Value,
}

impl ResponseEnvelope {
    pub fn new(code: u16, msg: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            msg: msg.into(),
            data,
        }
    }

    pub fn from_status(status: StatusCode, msg: impl Into<String>, data: Value) -> Self {
        Self::new(status.as_u16(), msg, data)
    }

    /// HTTP status carried by the envelope. Codes outside the valid range fall
    /// back to 500.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
