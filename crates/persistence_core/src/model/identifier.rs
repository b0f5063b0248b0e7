//! Object identifier value type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Canonical identifier of a persisted object within its class.
///
/// Single-field identifiers keep the scalar value (strings verbatim,
/// integers in decimal). Composite identifiers are the JSON array of the
/// identifier values in declared order, e.g. `["order-7",3]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Wraps an already-canonical identifier string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Builds a composite identifier from scalar parts in declared order.
    ///
    /// Returns `None` when any part is not a string or an integer.
    pub fn composite<I>(parts: I) -> Option<Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut values = Vec::new();
        for part in parts {
            let value = part.into();
            if !is_identifier_scalar(&value) {
                return None;
            }
            values.push(value);
        }
        Some(Self(Value::Array(values).to_string()))
    }

    /// Converts one JSON scalar into an identifier.
    pub(crate) fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self(text.clone())),
            Value::Number(number) if number.is_i64() || number.is_u64() => {
                Some(Self(number.to_string()))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

pub(crate) fn is_identifier_scalar(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Number(number) => number.is_i64() || number.is_u64(),
        _ => false,
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for Identifier {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<&Identifier> for Identifier {
    fn from(value: &Identifier) -> Self {
        value.clone()
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for Identifier {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for Identifier {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<u32> for Identifier {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

impl From<Uuid> for Identifier {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

impl From<&Uuid> for Identifier {
    fn from(value: &Uuid) -> Self {
        Self(value.to_string())
    }
}
