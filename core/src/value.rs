//! Normalized config value type: a small sum type standing in for the
//! untyped property bag the original CLI carried, stringified only at
//! the storage boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    List(Vec<String>),
    None,
}

impl Value {
    /// Canonical on-disk string form: booleans become Python-style
    /// `"yes"`/`"no"`, `None` becomes the literal `"none"`, lists become
    /// comma-joined strings.
    pub fn to_storage_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Bool(true) => "yes".to_string(),
            Value::Bool(false) => "no".to_string(),
            Value::Int(i) => i.to_string(),
            Value::List(items) => items.join(","),
            Value::None => "none".to_string(),
        }
    }

    /// Parse a raw stored string back into a [`Value`], normalizing the
    /// well-known boolean and none sentinels. `"0"`/`"1"` are left as
    /// plain strings rather than folded into `Bool` — they're valid
    /// magnitudes for integer properties (`children_max=1`,
    /// `allow_sysvipc=1`), and `as_bool()`/`get_int()` both already
    /// accept them in string form, so nothing downstream needs the
    /// value to already be `Bool` to read it either way. Everything
    /// else stays a plain string; callers that expect a list split on
    /// `,` themselves since plain strings may legitimately contain
    /// commas.
    pub fn from_storage_str(raw: &str) -> Value {
        match raw {
            "yes" | "true" | "on" => Value::Bool(true),
            "no" | "false" | "off" => Value::Bool(false),
            "none" | "" => Value::None,
            other => Value::String(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            Value::String(s) => match s.as_str() {
                "yes" | "true" | "on" | "1" => Some(true),
                "no" | "false" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_storage_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_bool() {
        assert_eq!(Value::Bool(true).to_storage_string(), "yes");
        assert_eq!(Value::from_storage_str("yes"), Value::Bool(true));
    }

    #[test]
    fn roundtrips_none() {
        assert_eq!(Value::None.to_storage_string(), "none");
        assert_eq!(Value::from_storage_str("none"), Value::None);
    }
}
