//! Structured-body decoders.

use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use indexmap::IndexMap;
use percent_encoding::percent_decode;
use serde_json::Value;
use svcbind_protocol::BindingError;

use crate::fields::FieldValue;

/// What a decoder extracted from a request body.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    /// Named fields, merged over the query string.
    Fields(Vec<(String, FieldValue)>),
    /// A structured value that is not a record, such as a JSON array.
    Value(Value),
}

/// Decodes one body media type into fields.
///
/// The resolver consults decoders by media type essence; a body whose media
/// type no decoder claims is left unread for the method.
pub trait BodyDecoder: Send + Sync {
    /// Lowercase media type essence, without parameters.
    fn media_type(&self) -> &'static str;

    fn decode(&self, body: &[u8]) -> Result<DecodedBody, BindingError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBodyDecoder;

impl BodyDecoder for JsonBodyDecoder {
    fn media_type(&self) -> &'static str {
        "application/json"
    }

    /// An empty body is a parse fault like any other malformed document.
    fn decode(&self, body: &[u8]) -> Result<DecodedBody, BindingError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|error| BindingError::Body(error.to_string()))?;
        Ok(match value {
            Value::Object(map) => DecodedBody::Fields(
                map.into_iter()
                    .map(|(name, value)| (name, FieldValue::Json(value)))
                    .collect(),
            ),
            other => DecodedBody::Value(other),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FormBodyDecoder;

impl BodyDecoder for FormBodyDecoder {
    fn media_type(&self) -> &'static str {
        "application/x-www-form-urlencoded"
    }

    fn decode(&self, body: &[u8]) -> Result<DecodedBody, BindingError> {
        Ok(DecodedBody::Fields(parse_form(body)?))
    }
}

/// Parses `application/x-www-form-urlencoded` input (a query string or a form
/// body), grouping repeated keys in arrival order. Empty keys are skipped.
///
/// A broken percent-escape or an escape sequence that does not decode to
/// UTF-8 fails the whole input.
pub fn parse_form(input: &[u8]) -> Result<Vec<(String, FieldValue)>, BindingError> {
    let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
    for pair in input.split(|byte| *byte == b'&') {
        let (name, value) = match pair.iter().position(|byte| *byte == b'=') {
            Some(at) => (&pair[..at], &pair[at + 1..]),
            None => (pair, &[][..]),
        };
        let name = decode_component(name)?;
        if name.is_empty() {
            continue;
        }
        grouped.entry(name).or_default().push(decode_component(value)?);
    }
    Ok(grouped
        .into_iter()
        .map(|(name, values)| (name, FieldValue::Text(values)))
        .collect())
}

fn decode_component(raw: &[u8]) -> Result<String, BindingError> {
    let malformed = || {
        BindingError::Decode(format!(
            "malformed form component {:?}",
            String::from_utf8_lossy(raw)
        ))
    };
    for (at, _) in raw.iter().enumerate().filter(|(_, byte)| **byte == b'%') {
        let escape = raw.get(at + 1..at + 3).ok_or_else(malformed)?;
        if !escape.iter().all(u8::is_ascii_hexdigit) {
            return Err(malformed());
        }
    }
    let spaced: Vec<u8> = raw
        .iter()
        .map(|byte| if *byte == b'+' { b' ' } else { *byte })
        .collect();
    percent_decode(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| malformed())
}

/// Media type essence of the request body, lowercased.
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = raw.split(';').next()?.trim();
    (!essence.is_empty()).then(|| essence.to_ascii_lowercase())
}
