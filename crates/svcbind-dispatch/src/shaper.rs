//! Turns a call outcome into exactly one response.
//!
//! First matching state wins: fault, then envelope, then declared error, then
//! the method's own response (single-output contracts and routes that bypass
//! response shaping), then serialized data.

use axum::Json;
use axum::http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use svcbind_protocol::envelope::{
    ARGUMENT_SERIALIZATION_FAILED, METHOD_FAULTED, METHOD_REPORTED_ERROR,
    PARSE_ARGUMENT_FAILED, RESPONSE_SERIALIZATION_FAILED, SUCCESS,
};
use svcbind_protocol::{
    BindingError, MethodContext, MethodReply, ResponseEnvelope, SandboxFault, SerializationFault,
};
use tracing::error;

use crate::descriptor::ResultArity;

/// The response plus the payload reported to telemetry.
#[derive(Debug)]
pub(crate) struct Shaped {
    pub response: Response,
    pub payload: Value,
}

/// Headers every response starts with. Passthrough methods may override
/// them on their context.
pub(crate) fn apply_default_headers(headers: &mut HeaderMap) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
}

pub(crate) fn shape<T: Serialize>(
    outcome: Result<MethodReply<T>, SandboxFault>,
    arity: ResultArity,
    bypass_response_body: bool,
    ctx: MethodContext,
) -> Shaped {
    let reply = match outcome {
        Ok(reply) => reply,
        Err(fault) => {
            let data = json!({ "message": fault.message, "trace": fault.trace });
            return enveloped(
                ctx.into_response_headers(),
                ResponseEnvelope::from_status(StatusCode::INTERNAL_SERVER_ERROR, METHOD_FAULTED, data),
            );
        }
    };

    match reply {
        MethodReply::Envelope(envelope) => enveloped(ctx.into_response_headers(), envelope),
        MethodReply::Err(failure) => enveloped(
            ctx.into_response_headers(),
            ResponseEnvelope::from_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                METHOD_REPORTED_ERROR,
                Value::String(format!("{failure:#}")),
            ),
        ),
        MethodReply::Ok(_) if arity == ResultArity::One || bypass_response_body => Shaped {
            response: ctx.into_response(),
            payload: Value::Null,
        },
        MethodReply::Ok(value) => match serde_json::to_value(&value) {
            Ok(data) => {
                let envelope = ResponseEnvelope::from_status(StatusCode::OK, SUCCESS, data);
                let response = envelope_response(&envelope, ctx.into_response_headers());
                Shaped {
                    response,
                    payload: envelope.data,
                }
            }
            Err(source) => {
                let fault = SerializationFault::new("response", source);
                error!(error = %fault, "method result could not be serialized");
                enveloped(
                    ctx.into_response_headers(),
                    ResponseEnvelope::from_status(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        RESPONSE_SERIALIZATION_FAILED,
                        Value::String(fault.to_string()),
                    ),
                )
            }
        },
    }
}

/// 400 answer for a request whose argument could not be bound.
pub(crate) fn binding_failure(failure: &BindingError) -> Response {
    let mut headers = HeaderMap::new();
    apply_default_headers(&mut headers);
    let envelope = ResponseEnvelope::from_status(
        StatusCode::BAD_REQUEST,
        PARSE_ARGUMENT_FAILED,
        Value::String(failure.to_string()),
    );
    envelope_response(&envelope, headers)
}

/// 500 answer replacing a shaped response when telemetry could not
/// serialize the bound argument.
pub(crate) fn serialization_fault(fault: &SerializationFault) -> Response {
    let mut headers = HeaderMap::new();
    apply_default_headers(&mut headers);
    let envelope = ResponseEnvelope::from_status(
        StatusCode::INTERNAL_SERVER_ERROR,
        ARGUMENT_SERIALIZATION_FAILED,
        Value::String(fault.to_string()),
    );
    envelope_response(&envelope, headers)
}

fn enveloped(headers: HeaderMap, envelope: ResponseEnvelope) -> Shaped {
    let response = envelope_response(&envelope, headers);
    let payload = json!({ "code": envelope.code, "msg": envelope.msg, "data": envelope.data });
    Shaped { response, payload }
}

/// Context headers are carried over, but an envelope is always labelled as
/// JSON whatever content type the method set before failing.
fn envelope_response(envelope: &ResponseEnvelope, headers: HeaderMap) -> Response {
    let mut response = (envelope.status(), Json(envelope)).into_response();
    response.headers_mut().extend(headers);
    apply_default_headers(response.headers_mut());
    response
}
