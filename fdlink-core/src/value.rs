//! The dynamic value model.
//!
//! Values are the native representation that the converters in [`crate::convert`] map to and
//! from wire JSON. Structs are represented as [`Value::Map`] (field order on the wire follows
//! the declaration, not the map), enum symbols as [`Value::String`].

use std::collections::{BTreeMap, BTreeSet};

use crate::Fd;

/// A value conforming to some declared [`crate::idl::Type`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of an optional value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A string, also used for enum symbols.
    String(String),
    /// A homogeneous list.
    List(Vec<Value>),
    /// A string-keyed dictionary, also used for structs.
    Map(BTreeMap<String, Value>),
    /// A set of strings.
    Set(BTreeSet<String>),
    /// An opaque foreign object, passed through as raw JSON.
    Foreign(serde_json::Value),
    /// A file descriptor handle. Compared by identity, not descriptor number.
    Fd(Fd),
}

impl Value {
    /// Build a [`Value::Map`] from key/value pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a [`Value::Set`] from strings.
    pub fn set<S, I>(entries: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        Value::Set(entries.into_iter().map(Into::into).collect())
    }

    /// The contained map, if this is a [`Value::Map`].
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The contained string, if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The contained integer, if this is a [`Value::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The contained boolean, if this is a [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The contained float, if this is a [`Value::Float`].
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The contained list, if this is a [`Value::List`].
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// The contained descriptor handle, if this is a [`Value::Fd`].
    pub fn as_fd(&self) -> Option<&Fd> {
        match self {
            Value::Fd(fd) => Some(fd),
            _ => None,
        }
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Fd> for Value {
    fn from(fd: Fd) -> Self {
        Value::Fd(fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_builder() {
        let v = Value::map([("a", Value::from(1)), ("b", Value::from(true))]);
        let map = v.as_map().unwrap();
        assert_eq!(map.get("a").unwrap().as_int(), Some(1));
        assert_eq!(map.get("b").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn fd_values_compare_by_identity() {
        let owned: std::os::fd::OwnedFd = std::fs::File::open("/dev/null").unwrap().into();
        let fd = Fd::from(owned);
        let a = Value::Fd(fd.clone());
        let b = Value::Fd(fd);
        assert_eq!(a, b);

        let other: std::os::fd::OwnedFd = std::fs::File::open("/dev/null").unwrap().into();
        let c = Value::Fd(Fd::from(other));
        assert_ne!(a, c);
    }
}
