//! Core value types shared by records, stores and the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute mapping of a record: field name to JSON value.
///
/// A `BTreeMap` keeps iteration and encoding deterministic.
pub type Attributes = BTreeMap<String, Value>;

/// A "last updated" instant as reported by the server.
///
/// The engine only ever compares timestamps, so the unit is whatever the
/// server uses (typically seconds or milliseconds since the Unix epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from its raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Reads a timestamp out of a JSON value.
    ///
    /// Accepts integers, integral floats and strings holding an integer.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(Self(v))
                } else if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                        Ok(Self(f as i64))
                    } else {
                        Err(format!("{} is not an integral timestamp", n))
                    }
                } else {
                    Err(format!("{} is out of range", n))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Self)
                .map_err(|_| format!("'{}' is not a number", s)),
            Value::Null => Err("value is null".into()),
            other => Err(format!("unexpected value {}", other)),
        }
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a record within its entity type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identifier is empty (and therefore unusable).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Reads an identifier out of a JSON value.
    ///
    /// Strings are taken as-is, integers are rendered in decimal.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
