//! Physical column descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON value types as observed by the backend's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Nested,
    Null,
}

impl JsonType {
    /// Classify a JSON value.
    pub fn of(value: &Value) -> JsonType {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    JsonType::Integer
                } else {
                    JsonType::Number
                }
            }
            Value::String(_) => JsonType::String,
            Value::Array(_) | Value::Object(_) => JsonType::Object,
        }
    }

    /// Check whether a value of this type can be stored in a column of
    /// `column_type`. Integers are a subset of numbers.
    pub fn matches(&self, column_type: JsonType) -> bool {
        if *self == column_type {
            return true;
        }
        matches!(
            (*self, column_type),
            (JsonType::Integer, JsonType::Number) | (JsonType::Number, JsonType::Integer)
        )
    }
}

/// A physical column backing one logical field.
///
/// A single logical name resolves to several of these when the underlying
/// documents are untyped and the same field holds different JSON types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Physical field name in the backend index
    pub es_column: String,
    /// Declared value type of this column
    pub json_type: JsonType,
    /// Nested-scope path from the root to this column's containment depth.
    /// Empty for root-scope columns.
    #[serde(default)]
    pub nested_path: Vec<String>,
}

impl Column {
    pub fn new(es_column: impl Into<String>, json_type: JsonType) -> Self {
        Self {
            es_column: es_column.into(),
            json_type,
            nested_path: Vec::new(),
        }
    }

    pub fn nested(
        es_column: impl Into<String>,
        json_type: JsonType,
        nested_path: Vec<String>,
    ) -> Self {
        Self {
            es_column: es_column.into(),
            json_type,
            nested_path,
        }
    }

    /// Nesting depth: 0 for root-scope columns.
    pub fn depth(&self) -> usize {
        self.nested_path.len()
    }

    /// Identifier of the scope containing this column, `"."` for the root.
    pub fn query_path(&self) -> &str {
        self.nested_path.last().map(String::as_str).unwrap_or(".")
    }
}
