//! # svcbind-accesslog — one log row per request
//!
//! [`access_log`] opens an [`AccessLogRow`] for every request, stores it in
//! the request extensions, and emits it through an [`AccessLogSink`] once the
//! response is ready. [`AccessLogRecorder`] lets the service router write its
//! method-call fields into the same row.

pub mod middleware;
pub mod recorder;
pub mod row;
pub mod sink;

pub use middleware::{AccessLog, X_REQUEST_ID, access_log};
pub use recorder::AccessLogRecorder;
pub use row::AccessLogRow;
pub use sink::{AccessLogSink, TracingSink};
