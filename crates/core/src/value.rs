//! The unified value type stored under each key.
//!
//! `Value` is the in-memory representation; `crate::serializer` handles its
//! on-disk encoding. The two are kept separate so the type can be used freely
//! (equality, cloning, pattern matching) without dragging the disk format
//! along with it.
//!
//! `Value`'s `Serialize`/`Deserialize` impls go through `ValueWire`, a tagged
//! shadow enum, so that any textual encoding of a `Value` tree (the WAL's SET
//! entries, the checkpoint file, nested `Array`/`Object` payloads) represents
//! `Bytes` as base64 rather than a JSON array of numbers.

use base64::Engine as _;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unified value type for everything havenkv stores.
///
/// `Undefined` is distinct from `Null`: it models "no value was supplied"
/// (the JSON-adjacent source this store's semantics are drawn from
/// distinguishes the two), while `Null` is an explicit stored null.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Absent value, distinct from `Null`.
    Undefined,
    /// Boolean.
    Bool(bool),
    /// IEEE-754 double.
    Number(f64),
    /// UTF-8 string.
    String(String),
    /// Opaque byte buffer.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// String-keyed map of values.
    Object(HashMap<String, Value>),
}

impl Value {
    /// Depth of the deepest `Array`/`Object` nesting below this value
    /// (0 for scalars). Used to reject pathologically deep structures
    /// before they're handed to the serializer.
    pub fn nesting_depth(&self) -> usize {
        match self {
            Value::Array(items) => 1 + items.iter().map(Value::nesting_depth).max().unwrap_or(0),
            Value::Object(fields) => {
                1 + fields.values().map(Value::nesting_depth).max().unwrap_or(0)
            }
            _ => 0,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

/// Shadow of `Value` used only for textual (de)serialization.
///
/// `#[serde(tag = "t", content = "v")]` keeps the wire shape explicit and
/// stable regardless of variant order, and gives `Bytes` a dedicated arm
/// whose payload is a base64 string instead of `Vec<u8>`'s default
/// array-of-numbers encoding.
#[derive(Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
enum ValueWire {
    #[serde(rename = "null")]
    Null,
    #[serde(rename = "undefined")]
    Undefined,
    #[serde(rename = "bool")]
    Bool(bool),
    #[serde(rename = "number")]
    Number(f64),
    #[serde(rename = "string")]
    String(String),
    #[serde(rename = "bytes")]
    Bytes(String),
    #[serde(rename = "array")]
    Array(Vec<ValueWire>),
    #[serde(rename = "object")]
    Object(HashMap<String, ValueWire>),
}

impl From<&Value> for ValueWire {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => ValueWire::Null,
            Value::Undefined => ValueWire::Undefined,
            Value::Bool(b) => ValueWire::Bool(*b),
            Value::Number(n) => ValueWire::Number(*n),
            Value::String(s) => ValueWire::String(s.clone()),
            Value::Bytes(b) => {
                ValueWire::Bytes(base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::Array(items) => ValueWire::Array(items.iter().map(ValueWire::from).collect()),
            Value::Object(fields) => ValueWire::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), ValueWire::from(v)))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<ValueWire> for Value {
    type Error = String;

    fn try_from(wire: ValueWire) -> Result<Self, Self::Error> {
        Ok(match wire {
            ValueWire::Null => Value::Null,
            ValueWire::Undefined => Value::Undefined,
            ValueWire::Bool(b) => Value::Bool(b),
            ValueWire::Number(n) => Value::Number(n),
            ValueWire::String(s) => Value::String(s),
            ValueWire::Bytes(encoded) => {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| format!("invalid base64 in Bytes value: {e}"))?;
                Value::Bytes(decoded)
            }
            ValueWire::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Value::try_from(item)?);
                }
                Value::Array(out)
            }
            ValueWire::Object(fields) => {
                let mut out = HashMap::with_capacity(fields.len());
                for (k, v) in fields {
                    out.insert(k, Value::try_from(v)?);
                }
                Value::Object(out)
            }
        })
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ValueWire::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = ValueWire::deserialize(deserializer)?;
        Value::try_from(wire).map_err(de::Error::custom)
    }
}
