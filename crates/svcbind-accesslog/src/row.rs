//! The ordered field map behind one access-log line.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};

pub const REQUEST_ID: &str = "requestId";
pub const BEGIN_TIME: &str = "beginTime";
pub const STATUS: &str = "status";
pub const DURATION: &str = "duration";
pub const REMOTE: &str = "remote";
pub const HTTP_METHOD: &str = "httpMethod";
pub const URI: &str = "uri";

/// One request's access-log fields. Clones share the same row, so a copy
/// placed in the request extensions can be filled by inner handlers while
/// the middleware keeps its own handle.
#[derive(Debug, Clone, Default)]
pub struct AccessLogRow {
    fields: Arc<Mutex<IndexMap<String, String>>>,
}

impl AccessLogRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field`, keeping its original position when it already exists.
    pub fn set(&self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.lock().insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<String> {
        self.fields.lock().get(field).cloned()
    }

    pub fn snapshot(&self) -> IndexMap<String, String> {
        self.fields.lock().clone()
    }

    pub fn to_json(&self) -> Value {
        let fields: Map<String, Value> = self
            .fields
            .lock()
            .iter()
            .map(|(field, value)| (field.clone(), Value::String(value.clone())))
            .collect();
        Value::Object(fields)
    }
}
