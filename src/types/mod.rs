//! # LR Semantic Types
//!
//! Declared types are resolved to a [`Type`] when the schema is built. The
//! textual form matches LR syntax (`[]string`, `map[string]int`, `os.base`),
//! which is also how types are serialized in the schema JSON.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Resolved field type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    // === Primitives ===
    /// `bool`
    Bool,
    /// `int` (64-bit signed)
    Int,
    /// `float` (64-bit)
    Float,
    /// `string`
    String,
    /// `regex`, stored as its source string
    Regex,
    /// `time`, UTC timestamp
    Time,
    /// `dict`, arbitrary structured data
    Dict,
    /// `any`, no type constraint
    Any,

    // === References ===
    /// Another resource, by ID (pack prefix stripped)
    Resource(String),

    // === Containers ===
    /// `[]T`
    Array(Box<Type>),
    /// `map[K]V`
    Map(Box<Type>, Box<Type>),
}

impl Type {
    /// Map a primitive type name; `None` for anything else
    pub fn primitive(name: &str) -> Option<Type> {
        let ty = match name {
            "bool" => Type::Bool,
            "int" => Type::Int,
            "float" => Type::Float,
            "string" => Type::String,
            "regex" => Type::Regex,
            "time" => Type::Time,
            "dict" => Type::Dict,
            "any" => Type::Any,
            _ => return None,
        };
        Some(ty)
    }

    /// Shorthand for `[]T`
    pub fn array(inner: Type) -> Type {
        Type::Array(Box::new(inner))
    }

    /// Shorthand for `map[K]V`
    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    /// Check if this type references a resource
    pub fn is_resource(&self) -> bool {
        matches!(self, Type::Resource(_))
    }

    /// Check if this is a primitive (non-container, non-resource) type
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Type::Resource(_) | Type::Array(_) | Type::Map(_, _))
    }

    /// Resource IDs referenced anywhere inside this type
    pub fn referenced_resources(&self) -> Vec<&str> {
        match self {
            Type::Resource(name) => vec![name.as_str()],
            Type::Array(inner) => inner.referenced_resources(),
            Type::Map(key, value) => {
                let mut refs = key.referenced_resources();
                refs.extend(value.referenced_resources());
                refs
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Regex => write!(f, "regex"),
            Type::Time => write!(f, "time"),
            Type::Dict => write!(f, "dict"),
            Type::Any => write!(f, "any"),
            Type::Resource(name) => write!(f, "{}", name),
            Type::Array(inner) => write!(f, "[]{}", inner),
            Type::Map(key, value) => write!(f, "map[{}]{}", key, value),
        }
    }
}

/// Error returned when a type string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTypeError(pub String);

impl fmt::Display for ParseTypeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid type '{}'", self.0)
    }
}

impl std::error::Error for ParseTypeError {}

impl FromStr for Type {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(inner) = s.strip_prefix("[]") {
            return Ok(Type::array(inner.parse()?));
        }

        if let Some(rest) = s.strip_prefix("map[") {
            let (key, value) = rest
                .split_once(']')
                .ok_or_else(|| ParseTypeError(s.to_string()))?;
            let key: Type = key.parse()?;
            if !matches!(key, Type::Resource(_)) && !key.is_primitive() {
                return Err(ParseTypeError(s.to_string()));
            }
            return Ok(Type::map(key, value.parse()?));
        }

        if let Some(ty) = Type::primitive(s) {
            return Ok(ty);
        }

        let valid_name = !s.is_empty()
            && s.split('.').all(|segment| {
                segment
                    .chars()
                    .next()
                    .map(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
                    .unwrap_or(false)
                    && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            });
        if valid_name {
            Ok(Type::Resource(s.to_string()))
        } else {
            Err(ParseTypeError(s.to_string()))
        }
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
