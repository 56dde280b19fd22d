//! The tagged result a bound method hands back to the dispatcher.

use serde_json::Value;

use crate::envelope::ResponseEnvelope;

/// What a method produced.
///
/// `Ok` carries the data (or `()` for methods that write their own response),
/// `Envelope` sets an arbitrary status code through the normal return channel,
/// and `Err` is a declared failure answered with a 500 envelope.
#[derive(Debug)]
pub enum MethodReply<T> {
    Ok(T),
    Envelope(ResponseEnvelope),
    Err(anyhow::Error),
}

impl<T> MethodReply<T> {
    pub fn error(error: impl Into<anyhow::Error>) -> Self {
        Self::Err(error.into())
    }

    pub fn envelope(code: u16, msg: impl Into<String>, data: Value) -> Self {
        Self::Envelope(ResponseEnvelope::new(code, msg, data))
    }
}

impl<T, E> From<Result<T, E>> for MethodReply<T>
where
    E: Into<anyhow::Error>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(error) => Self::Err(error.into()),
        }
    }
}

impl<T> From<ResponseEnvelope> for MethodReply<T> {
    fn from(envelope: ResponseEnvelope) -> Self {
        Self::Envelope(envelope)
    }
}
