//! Core data model: typed [`Value`]s, schema-less [`Record`]s and per-field type metadata.
//!
//! Every ingested row becomes one [`Record`], an ordered mapping from header name to [`Value`].
//! A [`FieldTypeMap`] decides how raw cell text is converted before storage or comparison.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

use crate::value_type::ValueType;

/// Text form used when a [`Value::Date`] is rendered as a string.
pub const DATE_TEXT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A single value in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string. An empty string is a present-but-empty cell.
    Utf8(String),
    /// UTC instant.
    Date(DateTime<Utc>),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Nested structured object.
    Document(IndexMap<String, Value>),
}

impl Value {
    /// Shorthand for [`Value::Utf8`].
    pub fn text(s: impl Into<String>) -> Self {
        Self::Utf8(s.into())
    }

    /// `true` for [`Value::Null`] and the empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Utf8(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `true` for integer and floating point values.
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int64(_) | Self::Float64(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(i) => Some(*i as f64),
            Self::Float64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render the value as text, the form raw cells arrive in.
    ///
    /// Dates use [`DATE_TEXT_FORMAT`], arrays render as `[a, b]` and documents as JSON.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int64(i) => i.to_string(),
            Self::Float64(f) => f.to_string(),
            Self::Utf8(s) => s.clone(),
            Self::Date(d) => d.format(DATE_TEXT_FORMAT).to_string(),
            Self::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_text).collect();
                format!("[{}]", parts.join(", "))
            }
            Self::Document(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// Equality that treats `Int64(1)` and `Float64(1.0)` as the same number.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// The [`ValueType`] whose in-memory representation this value is.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null | Self::Utf8(_) => ValueType::String,
            Self::Bool(_) => ValueType::Boolean,
            Self::Int64(_) | Self::Float64(_) => ValueType::Number,
            Self::Date(_) => ValueType::Date,
            Self::Document(_) => ValueType::Document,
            Self::Array(items) => {
                if !items.is_empty() && items.iter().all(Value::is_number) {
                    ValueType::NumberArray
                } else {
                    ValueType::StringArray
                }
            }
        }
    }

    /// Lossless conversion to a [`serde_json::Value`]. Dates become their text form.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Utf8(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Utf8(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float64(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int64(i),
                None => Self::Float64(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::Utf8(s),
            serde_json::Value::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Document(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int64(i) => serializer.serialize_i64(*i),
            Self::Float64(f) => serializer.serialize_f64(*f),
            Self::Utf8(s) => serializer.serialize_str(s),
            Self::Date(d) => serializer.collect_str(&d.format(DATE_TEXT_FORMAT)),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Document(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

/// One ingested row: an ordered mapping from field name to [`Value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(n),
        }
    }

    /// Insert or replace a field, keeping the original position on replace.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Look up a field by dotted path, descending into [`Value::Document`]s.
    ///
    /// A top-level field whose name contains dots wins over traversal.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.fields.get(path) {
            return Some(v);
        }
        let mut parts = path.split('.');
        let mut cur = self.fields.get(parts.next()?)?;
        for part in parts {
            match cur {
                Value::Document(map) => cur = map.get(part)?,
                _ => return None,
            }
        }
        Some(cur)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.fields.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Per-field type metadata derived from the values currently held.
    pub fn field_types(&self) -> FieldTypeMap {
        let mut types = FieldTypeMap::default();
        for (k, v) in &self.fields {
            if !v.is_empty() {
                types.insert(k.clone(), v.value_type());
            }
        }
        types
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.fields
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl From<IndexMap<String, Value>> for Record {
    fn from(fields: IndexMap<String, Value>) -> Self {
        Self { fields }
    }
}

/// Field name to [`ValueType`] mapping. Absent fields are [`ValueType::String`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldTypeMap {
    types: HashMap<String, ValueType>,
}

impl FieldTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value_type: ValueType) -> Option<ValueType> {
        self.types.insert(field.into(), value_type)
    }

    /// Declared type of `field`, defaulting to [`ValueType::String`].
    pub fn get(&self, field: &str) -> ValueType {
        self.declared(field).unwrap_or(ValueType::String)
    }

    /// Declared type of `field`, if any.
    pub fn declared(&self, field: &str) -> Option<ValueType> {
        self.types.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, ValueType)> for FieldTypeMap {
    fn from_iter<I: IntoIterator<Item = (K, ValueType)>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
