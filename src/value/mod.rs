//! # Row Value Representation
//!
//! The concrete value type flowing through the physical executor once a
//! hit has been fetched from a shard: a restricted JSON — enough to
//! support sorting (`PhysicalSort`), projection (`PhysicalProject`), and
//! client-side filter evaluation (`PhysicalFilter`) without depending on
//! the shard-local engine's internal representation.
//!
//! ## Sort ordering
//!
//! `null` sorts less than any value (§4.5). Among non-null values,
//! numeric types compare numerically and strings compare
//! lexicographically; comparing across those two families falls back to
//! a stable but otherwise unspecified order (numbers before strings) so
//! that `PhysicalSort` remains a total order regardless of what a shard
//! sends back.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A single field value in a document row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn from_json(v: &JsonValue) -> Self {
        match v {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::I64(i)
                } else {
                    Value::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Value::Str(s.clone()),
            JsonValue::Array(a) => Value::Array(a.iter().map(Value::from_json).collect()),
            JsonValue::Object(_) => Value::Str(v.to_string()),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::I64(i) => JsonValue::from(*i),
            Value::F64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Array(a) => JsonValue::Array(a.iter().map(Value::to_json).collect()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::I64(_) | Value::F64(_) => 1,
            Value::Bool(_) => 1,
            Value::Str(_) => 2,
            Value::Array(_) => 3,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        self.as_number()
    }

    /// Numeric view of this value, used by range-bound evaluation and
    /// metric aggregations. `Bool` counts as 0/1 so `avg`/`sum` over a
    /// boolean field behave sensibly.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::I64(i) => Some(*i as f64),
            Value::F64(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Total order used by `PhysicalSort`: null < numeric/bool < string < array.
    pub fn cmp_total(&self, other: &Value) -> Ordering {
        if matches!(self, Value::Null) || matches!(other, Value::Null) {
            return self.rank().cmp(&other.rank());
        }
        match (self.rank(), other.rank()) {
            (1, 1) => self
                .as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&other.as_f64().unwrap_or(0.0))
                .unwrap_or(Ordering::Equal),
            (2, 2) => {
                if let (Value::Str(a), Value::Str(b)) = (self, other) {
                    a.cmp(b)
                } else {
                    Ordering::Equal
                }
            }
            (ra, rb) => ra.cmp(&rb),
        }
    }
}

/// A document row: field name -> value. Ordered so that projection and
/// serialization are deterministic.
pub type Row = BTreeMap<String, Value>;

/// One hit in a search response: the document row plus the out-of-band
/// `_id`/`_score` fields every hit carries regardless of `_source`
/// filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub score: f64,
    pub source: Row,
}

impl Hit {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.source.get(name)
    }
}
