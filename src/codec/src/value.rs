//! Dynamically-typed value stored in a single meta hash field.

use serde::{Deserialize, Serialize};

/// The small set of value shapes the stored task metadata needs: null,
/// bool, number (split into int/float so round-tripping stays exact),
/// string, bytes, list, and record (an ordered field list rather than a
/// map, so encoding stays deterministic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Record(Vec<(String, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}
