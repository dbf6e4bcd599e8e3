//! Dynamic property values.
//!
//! Node properties, activity inputs and outputs, and workflow variables all
//! cross serialization boundaries, so they are carried as a small closed
//! [`Value`] type. Typed access goes through [`FromValue`], which is the one
//! place that decides how a wire value coerces into a Rust type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A key/value map of dynamic values (inputs, outputs, variables, config).
pub type DataMap = BTreeMap<String, Value>;

/// A dynamically typed value.
///
/// Serializes as plain JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(DataMap),
}

impl Value {
    /// Short name of the variant, used in type mismatch messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrows the string payload, without coercion.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows the map payload, without coercion.
    #[must_use]
    pub fn as_map(&self) -> Option<&DataMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Coerces this value into `T`, returning `None` when no coercion exists.
    #[must_use]
    pub fn coerce<T: FromValue>(&self) -> Option<T> {
        T::from_value(self)
    }

    /// Truthiness used by edge conditions.
    ///
    /// `null`, `false`, `0`, the empty string, the string `"false"` and empty
    /// collections are falsy; everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            Self::List(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => f.write_str(s),
            Self::List(_) | Self::Map(_) => {
                let json = serde_json::Value::from(self.clone());
                write!(f, "{json}")
            }
        }
    }
}

/// Renders integral numbers without a trailing `.0`.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Finds `key` in `map`, preferring an exact match over a case-insensitive one.
#[must_use]
pub fn lookup_ci<'a>(map: &'a DataMap, key: &str) -> Option<&'a Value> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// Coercion from a dynamic [`Value`] into a concrete type.
pub trait FromValue: Sized {
    /// Name reported when the coercion fails.
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "value";

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }
}

impl FromValue for f64 {
    const TYPE_NAME: &'static str = "number";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok().filter(|n: &f64| n.is_finite()),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }
}

impl FromValue for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn from_value(value: &Value) -> Option<Self> {
        let n = f64::from_value(value)?;
        let in_range = n >= i64::MIN as f64 && n <= i64::MAX as f64;
        (n.fract() == 0.0 && in_range).then_some(n as i64)
    }
}

impl FromValue for u64 {
    const TYPE_NAME: &'static str = "unsigned integer";

    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|n| u64::try_from(n).ok())
    }
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }
}

impl FromValue for Vec<Value> {
    const TYPE_NAME: &'static str = "list";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => Some(items.clone()),
            _ => None,
        }
    }
}

impl FromValue for DataMap {
    const TYPE_NAME: &'static str = "map";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Map(map) => Some(map.clone()),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Self::from(n as i64)
                } else {
                    serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number)
                }
            }
            Value::String(s) => Self::String(s),
            Value::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Map(map) => Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<DataMap> for Value {
    fn from(map: DataMap) -> Self {
        Self::Map(map)
    }
}

/// Converts a JSON object into a [`DataMap`]; any other JSON yields an empty map.
#[must_use]
pub fn data_map_from_json(json: serde_json::Value) -> DataMap {
    match Value::from(json) {
        Value::Map(map) => map,
        _ => DataMap::new(),
    }
}
