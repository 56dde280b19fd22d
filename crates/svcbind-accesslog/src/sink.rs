//! Where finished rows go.

use axum::http::StatusCode;
use tracing::{error, info};

use crate::row::AccessLogRow;

pub trait AccessLogSink: Send + Sync {
    fn emit(&self, status: StatusCode, row: &AccessLogRow);
}

/// Emits each row as one `tracing` event under the `access_log` target:
/// `info` below 400, `error` otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AccessLogSink for TracingSink {
    fn emit(&self, status: StatusCode, row: &AccessLogRow) {
        let fields = row.to_json();
        if status.as_u16() < 400 {
            info!(target: "access_log", status = status.as_u16(), row = %fields);
        } else {
            error!(target: "access_log", status = status.as_u16(), row = %fields);
        }
    }
}
