//! Typed property values
//!
//! Values are tagged with the scalar type of their property definition so
//! conformance can be checked without consulting the raw representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar type tag of a property definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Decimal,
    Integer,
    Boolean,
    DateTime,
    Uri,
    Id,
    Html,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::String => "string",
            PropertyType::Decimal => "decimal",
            PropertyType::Integer => "integer",
            PropertyType::Boolean => "boolean",
            PropertyType::DateTime => "datetime",
            PropertyType::Uri => "uri",
            PropertyType::Id => "id",
            PropertyType::Html => "html",
        };
        f.write_str(name)
    }
}

/// A single scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyValue {
    String(String),
    Decimal(f64),
    Integer(i64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Uri(String),
    Id(String),
    Html(String),
}

impl PropertyValue {
    /// Get the scalar type of this value
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Decimal(_) => PropertyType::Decimal,
            PropertyValue::Integer(_) => PropertyType::Integer,
            PropertyValue::Boolean(_) => PropertyType::Boolean,
            PropertyValue::DateTime(_) => PropertyType::DateTime,
            PropertyValue::Uri(_) => PropertyType::Uri,
            PropertyValue::Id(_) => PropertyType::Id,
            PropertyValue::Html(_) => PropertyType::Html,
        }
    }

    /// Borrow the textual payload of string-like values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s)
            | PropertyValue::Uri(s)
            | PropertyValue::Id(s)
            | PropertyValue::Html(s) => Some(s),
            _ => None,
        }
    }

    /// Total order used by `orderBy`; values of different types compare by
    /// type tag so sorting never panics.
    pub(crate) fn sort_cmp(&self, other: &PropertyValue) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (PropertyValue::Decimal(a), PropertyValue::Decimal(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (PropertyValue::Integer(a), PropertyValue::Integer(b)) => a.cmp(b),
            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => a.cmp(b),
            (PropertyValue::DateTime(a), PropertyValue::DateTime(b)) => a.cmp(b),
            (a, b) => match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => (a.property_type() as u8).cmp(&(b.property_type() as u8)),
            },
        }
    }
}

/// A property value with its cardinality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Single(PropertyValue),
    Multi(Vec<PropertyValue>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Single(PropertyValue::String(s.into()))
    }

    pub fn id(s: impl Into<String>) -> Self {
        Value::Single(PropertyValue::Id(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Value::Single(PropertyValue::Boolean(b))
    }

    pub fn integer(i: i64) -> Self {
        Value::Single(PropertyValue::Integer(i))
    }

    pub fn datetime(d: DateTime<Utc>) -> Self {
        Value::Single(PropertyValue::DateTime(d))
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Multi(ids.into_iter().map(|s| PropertyValue::Id(s.into())).collect())
    }

    /// Get the single value, if this is single-valued
    pub fn as_single(&self) -> Option<&PropertyValue> {
        match self {
            Value::Single(v) => Some(v),
            Value::Multi(_) => None,
        }
    }

    /// Iterate over every scalar in the value
    pub fn values(&self) -> impl Iterator<Item = &PropertyValue> {
        let slice: &[PropertyValue] = match self {
            Value::Single(v) => std::slice::from_ref(v),
            Value::Multi(vs) => vs.as_slice(),
        };
        slice.iter()
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Value::Multi(_))
    }
}
