//! Core data model types shared by the normalizer, the reconciler, and the store.
//!
//! Every entity is described by a [`Schema`] (an ordered list of typed [`Field`]s). Records are
//! positional: `record.values[i]` holds the value of `schema.fields[i]`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// UTF-8 string.
    Utf8,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A list of fields describing the stored shape of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed value in a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Utf8(s.into())
    }

    /// String view; `None` for non-text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// True for `Null` and for strings that are empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Utf8(s) => s.trim().is_empty(),
            Self::Int64(_) => false,
        }
    }

    /// Whether this value may be stored in a field of `data_type`.
    pub fn fits(&self, data_type: DataType) -> bool {
        matches!(
            (self, data_type),
            (Self::Null, _) | (Self::Int64(_), DataType::Int64) | (Self::Utf8(_), DataType::Utf8)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(s) => f.write_str(s),
        }
    }
}

/// Projection of a record onto its natural-key fields.
pub type NaturalKey = Vec<Value>;

/// One positional row of typed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Values at `idxs`, in that order. Missing positions project to `Null`.
    pub fn project(&self, idxs: &[usize]) -> NaturalKey {
        idxs.iter()
            .map(|&i| self.values.get(i).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Text value at `idx`; `Null` reads as the empty string.
    pub fn text_at(&self, idx: usize) -> String {
        match self.values.get(idx) {
            Some(Value::Utf8(s)) => s.clone(),
            Some(Value::Int64(v)) => v.to_string(),
            Some(Value::Null) | None => String::new(),
        }
    }

    /// Integer value at `idx`; `Null` reads as zero.
    pub fn int_at(&self, idx: usize) -> i64 {
        match self.values.get(idx) {
            Some(Value::Int64(v)) => *v,
            _ => 0,
        }
    }
}
