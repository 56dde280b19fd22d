//! Per-call telemetry port.

use axum::http::Extensions;

pub const METHOD_CALL_ARGUMENT: &str = "methodCallArgument";
pub const METHOD_CALL_RESPONSE_DATA: &str = "methodCallResponseData";
pub const METHOD_CALL_BEGIN_TIME: &str = "methodCallBeginTime";
pub const METHOD_CALL_DURATION: &str = "methodCallDuration";

/// Receives one string field at a time after a call has been shaped.
///
/// Implementations are injected into the router at construction. The request's
/// extensions are passed through so a recorder can reach request-scoped sinks
/// (an access-log row, for instance) without a global lookup.
pub trait MethodCallRecorder: Send + Sync {
    /// When `false` the dispatcher skips serializing the argument and payload.
    fn enabled(&self) -> bool {
        true
    }

    fn record(&self, extensions: &Extensions, field: &'static str, value: String);
}

/// Default recorder; records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl MethodCallRecorder for NoopRecorder {
    fn enabled(&self) -> bool {
        false
    }

    fn record(&self, _extensions: &Extensions, _field: &'static str, _value: String) {}
}
