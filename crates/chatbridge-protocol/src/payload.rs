//! Normalization of dynamic JSON inputs.
//!
//! Payload arguments arrive as arbitrary JSON (often as a string typed into a
//! workflow parameter). They are classified once at the boundary so encoders
//! never inspect raw values.

use crate::error::{BridgeError, BridgeResult};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum JsonPayload {
    Object(Map<String, Value>),
    Array(Vec<Value>),
    /// Strings, numbers, booleans and null.
    Scalar(Value),
}

impl JsonPayload {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(map),
            Value::Array(items) => Self::Array(items),
            scalar => Self::Scalar(scalar),
        }
    }

    /// Parse a JSON string argument; `field` names the argument in the error.
    pub fn parse(field: &str, raw: &str) -> BridgeResult<Self> {
        serde_json::from_str::<Value>(raw)
            .map(Self::from_value)
            .map_err(|error| BridgeError::malformed(field, error))
    }

    /// Canonical "sequence of items": arrays pass through, anything else is
    /// wrapped in a one-element sequence.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Array(items) => items,
            Self::Object(map) => vec![Value::Object(map)],
            Self::Scalar(value) => vec![value],
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Object(map) => Value::Object(map),
            Self::Array(items) => Value::Array(items),
            Self::Scalar(value) => value,
        }
    }
}
