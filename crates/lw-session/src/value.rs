//! Tagged value type for everything the engine hands back.
//!
//! Engines report text, flags, choice records, tag lists and variables as
//! loosely-typed data. The session converts that data through the accessors
//! here, which fail closed: a shape mismatch yields `None` (or a default)
//! instead of an error.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A loosely-typed engine value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent or unset. Also used as the initial value of observed variables.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A text value.
    Str(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map of values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Whether this is the unset sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The text, if this is a string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is an integer or a float without a fractional part.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// The number as a float, if this is numeric.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// The elements, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The entries, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key, if this is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// The text, or an empty string for any other shape.
    pub fn text_or_default(&self) -> String {
        self.as_text().map(str::to_string).unwrap_or_default()
    }

    /// The boolean, or `false` for any other shape.
    pub fn bool_or_false(&self) -> bool {
        self.as_bool().unwrap_or(false)
    }

    /// The string elements of a list, skipping anything else.
    ///
    /// Non-list values produce an empty vector.
    pub fn strings(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_text().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Map(_) => write!(f, "{{...}}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_fail_closed() {
        let v = Value::from("hello");
        assert_eq!(v.as_text(), Some("hello"));
        assert_eq!(v.as_int(), None);
        assert_eq!(v.as_bool(), None);
        assert!(v.as_list().is_none());
        assert!(!v.bool_or_false());
    }

    #[test]
    fn numeric_widening() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(4.0).as_int(), Some(4));
        assert_eq!(Value::Float(4.5).as_int(), None);
    }

    #[test]
    fn strings_skips_non_text() {
        let v = Value::List(vec![Value::from("a"), Value::Int(1), Value::from("b")]);
        assert_eq!(v.strings(), vec!["a".to_string(), "b".to_string()]);
        assert!(Value::Null.strings().is_empty());
    }

    #[test]
    fn map_lookup() {
        let mut map = BTreeMap::new();
        map.insert("index".to_string(), Value::Int(2));
        let v = Value::Map(map);
        assert_eq!(v.get("index").and_then(Value::as_int), Some(2));
        assert!(v.get("text").is_none());
        assert!(Value::Int(1).get("index").is_none());
    }

    #[test]
    fn json_round_trip_keeps_shape() {
        let v: Value = serde_json::from_str(r#"{"a": [1, 2.5, "x", true, null]}"#).unwrap();
        let list = v.get("a").and_then(Value::as_list).unwrap();
        assert_eq!(list[0], Value::Int(1));
        assert_eq!(list[1], Value::Float(2.5));
        assert_eq!(list[2], Value::from("x"));
        assert_eq!(list[3], Value::Bool(true));
        assert!(list[4].is_null());
    }

    #[test]
    fn display() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::from(vec![1i64, 2]).to_string(), "[1, 2]");
    }
}
