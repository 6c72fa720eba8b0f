//! Column schema and loosely-typed scalar values as returned by the table API.
//!
//! A [`Schema`] is the ordered `{name, type}` list that accompanies every page of
//! rows. Type tags are informational: values are never coerced by tag, only by
//! the decoder of the record type that consumes them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single column description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
}

impl Field {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
        }
    }
}

/// Ordered column list.
///
/// Field names are assumed unique. Comparison (`==` and [`Schema::is_subset_of`])
/// looks at names only and ignores both column order and type tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Build a schema from `(name, type)` pairs.
    pub fn of(pairs: &[(&str, &str)]) -> Self {
        Self::new(pairs.iter().map(|(n, t)| Field::new(*n, *t)).collect())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Position of a column, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Column name to position map.
    pub fn positions(&self) -> HashMap<&str, usize> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), i))
            .collect()
    }

    /// Column names in schema order.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// True if every column of `self` is also present in `other`.
    pub fn is_subset_of(&self, other: &Schema) -> bool {
        self.fields.iter().all(|f| other.contains(&f.name))
    }

    /// Columns of `self` that `other` lacks.
    pub fn missing_from(&self, other: &Schema) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !other.contains(&f.name))
            .map(|f| f.name.clone())
            .collect()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_subset_of(other) && other.is_subset_of(self)
    }
}

impl Eq for Schema {}

/// One scalar cell of a decoded row. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Short name of the variant, used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "boolean",
            RawValue::Number(_) => "number",
            RawValue::String(_) => "string",
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => write!(f, "null"),
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Number(n) => write!(f, "{n}"),
            RawValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::String(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}
