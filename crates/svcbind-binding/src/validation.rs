//! Declarative argument validation.
//!
//! Two sources of rules apply to record arguments: the type's own
//! `validate` hook and an optional JSON schema attached to the route.

use std::fmt;

use jsonschema::{Draft, Validator};
use serde_json::Value;

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Field { field: String, rule: String },
    Schema(String),
}

impl Violation {
    pub fn field(field: impl Into<String>, rule: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            rule: rule.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { field, rule } => write!(f, "field `{field}` failed rule: {rule}"),
            Self::Schema(message) => f.write_str(message),
        }
    }
}

pub fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A compiled route schema.
pub struct SchemaRules {
    validator: Validator,
}

impl SchemaRules {
    /// Compiles `schema` under draft 2020-12. The schema must describe an
    /// object, since only record arguments are schema-validated.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        if !describes_object(schema) {
            return Err("schema must describe an object".to_owned());
        }
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .map_err(|error| error.to_string())?;
        Ok(Self { validator })
    }

    pub fn check(&self, instance: &Value) -> Vec<Violation> {
        self.validator
            .iter_errors(instance)
            .map(|error| Violation::Schema(error.to_string()))
            .collect()
    }
}

impl fmt::Debug for SchemaRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRules").finish_non_exhaustive()
    }
}

fn describes_object(schema: &Value) -> bool {
    let Some(schema) = schema.as_object() else {
        return false;
    };
    match schema.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        Some(_) => false,
        None => schema.contains_key("properties") || schema.contains_key("required"),
    }
}
