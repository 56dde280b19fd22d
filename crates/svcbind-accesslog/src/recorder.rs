use axum::http::Extensions;
use svcbind_protocol::MethodCallRecorder;

use crate::row::AccessLogRow;

/// Writes method-call telemetry into the request's access-log row. Requests
/// that did not pass through the middleware are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessLogRecorder;

impl MethodCallRecorder for AccessLogRecorder {
    fn record(&self, extensions: &Extensions, field: &'static str, value: String) {
        if let Some(row) = extensions.get::<AccessLogRow>() {
            row.set(field, value);
        }
    }
}
