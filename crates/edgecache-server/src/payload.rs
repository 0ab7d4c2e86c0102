//! Lenient JSON request bodies.
//!
//! Clients get validation results, not parse errors: a missing or malformed
//! body reads as an empty object, and scalar fields of the wrong JSON type
//! are coerced to strings. Decisions about empty values belong to the
//! engine.

use serde_json::{Map, Value};

/// A request body as a loosely-typed JSON object.
#[derive(Debug, Default)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Parse `body`; anything but a JSON object yields an empty payload.
    #[must_use]
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    /// A string field, or `default` when it is absent or null.
    #[must_use]
    pub fn string(&self, name: &str, default: &str) -> String {
        match self.0.get(name) {
            None | Some(Value::Null) => default.to_owned(),
            Some(value) => scalar_to_string(value),
        }
    }

    /// A list of strings. An object contributes its values in key order;
    /// any other non-array reads as empty.
    #[must_use]
    pub fn string_list(&self, name: &str) -> Vec<String> {
        match self.0.get(name) {
            Some(Value::Array(items)) => items.iter().map(scalar_to_string).collect(),
            Some(Value::Object(fields)) => fields.values().map(scalar_to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// An integer timestamp; absent, null, or non-numeric reads as `None`.
    #[must_use]
    pub fn timestamp(&self, name: &str) -> Option<i64> {
        match self.0.get(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(truncate)),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_owned(),
        Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(value: f64) -> i64 {
    value as i64
}
