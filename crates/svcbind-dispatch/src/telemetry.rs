//! Hands a finished call to the injected recorder.

use axum::http::Extensions;
use serde::Serialize;
use serde_json::Value;
use svcbind_protocol::telemetry::{
    METHOD_CALL_ARGUMENT, METHOD_CALL_BEGIN_TIME, METHOD_CALL_DURATION, METHOD_CALL_RESPONSE_DATA,
};
use svcbind_protocol::{MethodCallRecorder, SerializationFault};
use svcbind_sandbox::CallTiming;

/// Records the four call fields. Nothing is recorded when the argument
/// cannot be serialized.
pub(crate) fn record_call<A: Serialize>(
    recorder: &dyn MethodCallRecorder,
    extensions: &Extensions,
    argument: &A,
    payload: &Value,
    timing: &CallTiming,
) -> Result<(), SerializationFault> {
    if !recorder.enabled() {
        return Ok(());
    }
    let argument = serde_json::to_string(argument)
        .map_err(|source| SerializationFault::new("argument", source))?;

    recorder.record(extensions, METHOD_CALL_ARGUMENT, argument);
    recorder.record(extensions, METHOD_CALL_RESPONSE_DATA, payload.to_string());
    recorder.record(extensions, METHOD_CALL_BEGIN_TIME, timing.begin_time_label());
    recorder.record(extensions, METHOD_CALL_DURATION, timing.duration_label());
    Ok(())
}
