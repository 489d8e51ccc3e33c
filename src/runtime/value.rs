//! Tagged field values
//!
//! Every cached field holds a [`Value`]. Generated bindings convert between
//! `Value` and native Rust types through [`FromValue`] and `From` impls, so a
//! cast is an exhaustive match rather than a downcast.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::resource::Resource;
use crate::types::Type;

/// Runtime value of a field or constructor argument
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// String (also used for `regex`)
    String(String),
    /// UTC timestamp
    Time(DateTime<Utc>),
    /// Arbitrary structured data
    Dict(serde_json::Value),
    /// Reference to another resource instance
    Resource(Arc<Resource>),
    /// Array of values (Arc for cheap cloning)
    Array(Arc<Vec<Value>>),
    /// String-keyed map (Arc for cheap cloning)
    Map(Arc<BTreeMap<String, Value>>),
}

impl Value {
    /// Create an array value
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    /// Create a map value
    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Arc::new(entries))
    }

    /// Get type name for error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Time(_) => "time".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Resource(r) => r.name().to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Map(_) => "map".to_string(),
        }
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check whether the value may be stored in a field of type `ty`
    pub fn matches(&self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Any) => true,
            (Value::Null, _) => true,
            (Value::Bool(_), Type::Bool) => true,
            (Value::Int(_), Type::Int) => true,
            (Value::Float(_), Type::Float) => true,
            (Value::String(_), Type::String | Type::Regex) => true,
            (Value::Time(_), Type::Time) => true,
            (Value::Dict(_), Type::Dict) => true,
            (Value::Resource(r), Type::Resource(name)) => r.name() == name,
            (Value::Array(items), Type::Array(inner)) => items.iter().all(|v| v.matches(inner)),
            (Value::Map(entries), Type::Map(_, inner)) => {
                entries.values().all(|v| v.matches(inner))
            }
            _ => false,
        }
    }

    /// Convert to a native type, `None` if the variant does not match
    pub fn get<T: FromValue>(&self) -> Option<T> {
        T::from_value(self)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            // instances are identified by kind and id
            (Value::Resource(a), Value::Resource(b)) => {
                Arc::ptr_eq(a, b) || (a.name() == b.name() && a.id() == b.id())
            }
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Dict(d) => write!(f, "{}", d),
            Value::Resource(r) => write!(f, "{} id = {}", r.name(), r.id()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Conversion out of a [`Value`]
pub trait FromValue: Sized {
    /// Type name used in cast errors
    const TYPE_NAME: &'static str;

    /// Convert, `None` when the variant does not match
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($ty:ty, $name:expr, $pat:pat => $out:expr) => {
        impl FromValue for $ty {
            const TYPE_NAME: &'static str = $name;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    $pat => Some($out),
                    _ => None,
                }
            }
        }
    };
}

impl_from_value!(bool, "bool", Value::Bool(b) => *b);
impl_from_value!(i64, "int", Value::Int(n) => *n);
impl_from_value!(f64, "float", Value::Float(x) => *x);
impl_from_value!(String, "string", Value::String(s) => s.clone());
impl_from_value!(DateTime<Utc>, "time", Value::Time(t) => *t);
impl_from_value!(Arc<Resource>, "resource", Value::Resource(r) => r.clone());
impl_from_value!(Vec<Value>, "array", Value::Array(items) => items.as_ref().clone());
impl_from_value!(BTreeMap<String, Value>, "map", Value::Map(entries) => entries.as_ref().clone());

impl FromValue for Value {
    const TYPE_NAME: &'static str = "any";

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

impl From<serde_json::Value> for Value {
    fn from(d: serde_json::Value) -> Self {
        Value::Dict(d)
    }
}

impl From<Arc<Resource>> for Value {
    fn from(r: Arc<Resource>) -> Self {
        Value::Resource(r)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::map(entries)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
