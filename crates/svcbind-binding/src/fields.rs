//! Merged request fields and the deserializer that binds them to a typed
//! argument.
//!
//! Text values (query string, form bodies, path captures) stay text until the
//! target type asks for something else, at which point they are parsed. Field
//! names match exactly first and then ignoring ASCII case; names the target
//! does not declare are dropped.

use indexmap::IndexMap;
use serde::de::value::{MapDeserializer, SeqDeserializer, StringDeserializer};
use serde::de::{DeserializeOwned, Deserializer, Error as _, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;
use serde_json::{Error as JsonError, Value};
use svcbind_protocol::BindingError;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Already-typed value from a structured body.
    Json(Value),
    /// Raw text; repeated keys keep every value in arrival order.
    Text(Vec<String>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(vec![value.into()])
    }
}

/// Fields collected from every request source, later sources overwriting
/// earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    fields: IndexMap<String, FieldValue>,
    whole: Option<Value>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays `fields` onto the set. Each key replaces an existing key that
    /// matches it ignoring ASCII case.
    pub fn merge<K: Into<String>>(&mut self, fields: impl IntoIterator<Item = (K, FieldValue)>) {
        for (name, value) in fields {
            let name = name.into();
            if let Some(index) = self.position(&name) {
                self.fields.shift_remove_index(index);
            }
            self.fields.insert(name, value);
        }
    }

    /// Records a structured body that is not a record (a JSON array, say).
    pub fn set_whole(&mut self, value: Value) {
        self.whole = Some(value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.position(name)
            .and_then(|index| self.fields.get_index(index))
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.whole.is_none()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.get_index_of(name).or_else(|| {
            self.fields
                .keys()
                .position(|key| key.eq_ignore_ascii_case(name))
        })
    }

    pub fn into_record<T: DeserializeOwned>(self) -> Result<T, BindingError> {
        if let Some(whole) = &self.whole {
            return Err(BindingError::Body(format!(
                "expected a JSON object, got {}",
                json_kind(whole)
            )));
        }
        T::deserialize(RecordDeserializer {
            fields: self.fields,
        })
        .map_err(|error| BindingError::Decode(error.to_string()))
    }

    /// Binds a list argument from a structured array body. Without one the
    /// list is empty; text fields never populate list elements.
    pub fn into_list<T: DeserializeOwned>(self) -> Result<Vec<T>, BindingError> {
        match self.whole {
            None => Ok(Vec::new()),
            Some(items @ Value::Array(_)) => serde_json::from_value(items)
                .map_err(|error| BindingError::Decode(error.to_string())),
            Some(other) => Err(BindingError::Body(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn resolve_field(declared: &'static [&'static str], key: &str) -> Option<&'static str> {
    declared
        .iter()
        .find(|name| **name == key)
        .or_else(|| declared.iter().find(|name| name.eq_ignore_ascii_case(key)))
        .copied()
}

fn field_error(name: &str, error: impl std::fmt::Display) -> JsonError {
    JsonError::custom(format!("field `{name}`: {error}"))
}

fn last_text(name: &str, mut values: Vec<String>) -> Result<String, JsonError> {
    values.pop().ok_or_else(|| field_error(name, "no value"))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn visit_fields<'de, V: Visitor<'de>>(
    entries: Vec<(String, FieldValue)>,
    visitor: V,
) -> Result<V::Value, JsonError> {
    let entries = entries.into_iter().map(|(name, value)| {
        let field = FieldDeserializer {
            name: name.clone(),
            value,
        };
        (name, field)
    });
    let mut map: MapDeserializer<'de, _, JsonError> = MapDeserializer::new(entries);
    let value = visitor.visit_map(&mut map)?;
    map.end()?;
    Ok(value)
}

fn visit_text_seq<'de, V: Visitor<'de>>(
    name: String,
    values: Vec<String>,
    visitor: V,
) -> Result<V::Value, JsonError> {
    let elements = values.into_iter().map(move |value| FieldDeserializer {
        name: name.clone(),
        value: FieldValue::text(value),
    });
    let mut seq: SeqDeserializer<_, JsonError> = SeqDeserializer::new(elements);
    let value = visitor.visit_seq(&mut seq)?;
    seq.end()?;
    Ok(value)
}

struct RecordDeserializer {
    fields: IndexMap<String, FieldValue>,
}

impl<'de> Deserializer<'de> for RecordDeserializer {
    type Error = JsonError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
        visit_fields(self.fields.into_iter().collect(), visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        declared: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, JsonError> {
        let resolved = self
            .fields
            .into_iter()
            .filter_map(|(key, value)| {
                resolve_field(declared, &key).map(|name| (name.to_owned(), value))
            })
            .collect();
        visit_fields(resolved, visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, JsonError> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map enum
        identifier ignored_any
    }
}

struct FieldDeserializer {
    name: String,
    value: FieldValue,
}

impl<'de> IntoDeserializer<'de, JsonError> for FieldDeserializer {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
                let FieldDeserializer { name, value } = self;
                match value {
                    FieldValue::Json(json) => json
                        .$method(visitor)
                        .map_err(|error| field_error(&name, error)),
                    FieldValue::Text(values) => {
                        let raw = last_text(&name, values)?;
                        let parsed: $ty = raw.trim().parse().map_err(|_| {
                            field_error(
                                &name,
                                format!("invalid {} value {raw:?}", stringify!($ty)),
                            )
                        })?;
                        visitor.$visit(parsed)
                    }
                }
            }
        )*
    };
}

macro_rules! deserialize_textual {
    ($($method:ident),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
                let FieldDeserializer { name, value } = self;
                match value {
                    FieldValue::Json(json) => json
                        .$method(visitor)
                        .map_err(|error| field_error(&name, error)),
                    FieldValue::Text(values) => visitor.visit_string(last_text(&name, values)?),
                }
            }
        )*
    };
}

impl<'de> Deserializer<'de> for FieldDeserializer {
    type Error = JsonError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
        let FieldDeserializer { name, value } = self;
        match value {
            FieldValue::Json(json) => json
                .deserialize_any(visitor)
                .map_err(|error| field_error(&name, error)),
            FieldValue::Text(values) if values.len() == 1 => {
                visitor.visit_string(last_text(&name, values)?)
            }
            FieldValue::Text(values) => visit_text_seq(name, values, visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
        let FieldDeserializer { name, value } = self;
        match value {
            FieldValue::Json(json) => json
                .deserialize_bool(visitor)
                .map_err(|error| field_error(&name, error)),
            FieldValue::Text(values) => {
                let raw = last_text(&name, values)?;
                let parsed = parse_bool(&raw)
                    .ok_or_else(|| field_error(&name, format!("invalid bool value {raw:?}")))?;
                visitor.visit_bool(parsed)
            }
        }
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8(i8),
        deserialize_i16 => visit_i16(i16),
        deserialize_i32 => visit_i32(i32),
        deserialize_i64 => visit_i64(i64),
        deserialize_u8 => visit_u8(u8),
        deserialize_u16 => visit_u16(u16),
        deserialize_u32 => visit_u32(u32),
        deserialize_u64 => visit_u64(u64),
        deserialize_f32 => visit_f32(f32),
        deserialize_f64 => visit_f64(f64),
    }

    deserialize_textual! {
        deserialize_str,
        deserialize_string,
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
        let FieldDeserializer { name, value } = self;
        match value {
            FieldValue::Json(json) => json
                .deserialize_seq(visitor)
                .map_err(|error| field_error(&name, error)),
            FieldValue::Text(values) => visit_text_seq(name, values, visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, JsonError> {
        let FieldDeserializer { name, value } = self;
        match value {
            FieldValue::Json(json) => json
                .deserialize_option(visitor)
                .map_err(|error| field_error(&name, error)),
            FieldValue::Text(values) if values.last().is_none_or(String::is_empty) => {
                visitor.visit_none()
            }
            FieldValue::Text(values) => visitor.visit_some(FieldDeserializer {
                name,
                value: FieldValue::Text(values),
            }),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        struct_name: &'static str,
        visitor: V,
    ) -> Result<V::Value, JsonError> {
        match self.value {
            FieldValue::Json(json) => json
                .deserialize_newtype_struct(struct_name, visitor)
                .map_err(|error| field_error(&self.name, error)),
            text @ FieldValue::Text(_) => visitor.visit_newtype_struct(FieldDeserializer {
                name: self.name,
                value: text,
            }),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        enum_name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, JsonError> {
        let FieldDeserializer { name, value } = self;
        match value {
            FieldValue::Json(json) => json
                .deserialize_enum(enum_name, variants, visitor)
                .map_err(|error| field_error(&name, error)),
            FieldValue::Text(values) => {
                let variant: StringDeserializer<JsonError> =
                    last_text(&name, values)?.into_deserializer();
                visitor
                    .visit_enum(variant)
                    .map_err(|error| field_error(&name, error))
            }
        }
    }

    forward_to_deserialize_any! {
        char bytes byte_buf unit unit_struct tuple tuple_struct map struct
        identifier ignored_any
    }
}
