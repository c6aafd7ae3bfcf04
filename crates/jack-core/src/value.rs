//! Dynamic JSON value and dot-path addressing.
//!
//! The control protocol and the transaction manager pass untyped JSON
//! around; this module gives that untyped data a concrete shape (a tagged
//! sum, ordered like the JSON it came from) and the dot-path walk used by
//! `get`/`set`/`diff`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{JackError, Result};

/// Tagged JSON value. `Object` preserves insertion order so textual diffs
/// and re-serialization are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn object() -> Self {
        Value::Object(IndexMap::new())
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Object(_) | Value::List(_))
    }

    /// Lossless conversion from `serde_json::Value`.
    pub fn from_json(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => {
                Value::List(a.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(m) => {
                let mut out = IndexMap::with_capacity(m.len());
                for (k, v) in m {
                    out.insert(k, Value::from_json(v));
                }
                Value::Object(out)
            }
        }
    }

    /// Lossless conversion to `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Object(m) => {
                let mut out = serde_json::Map::with_capacity(m.len());
                for (k, v) in m {
                    out.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(out)
            }
        }
    }

    /// Stable textual form used for diff old/new rendering.
    pub fn to_stable_text(&self) -> String {
        serde_json::to_string(&self.to_json()).unwrap_or_default()
    }

    /// Walk a dot-path (already split into segments) through nested
    /// objects. Fails with `NotFound` on a missing segment and
    /// `TypeError` (reported as `Validation`) if a segment tries to
    /// traverse a scalar.
    pub fn get_path(&self, segments: &[&str]) -> Result<&Value> {
        let mut cur = self;
        for (i, seg) in segments.iter().enumerate() {
            match cur {
                Value::Object(m) => {
                    cur = m.get(*seg).ok_or_else(|| {
                        JackError::NotFound(format!(
                            "path segment '{}' not found (at '{}')",
                            seg,
                            segments[..=i].join(".")
                        ))
                    })?;
                }
                Value::List(l) => {
                    let idx: usize = seg.parse().map_err(|_| {
                        JackError::Validation(vec![format!(
                            "expected numeric index, got '{}'",
                            seg
                        )])
                    })?;
                    cur = l.get(idx).ok_or_else(|| {
                        JackError::NotFound(format!("index {} out of range", idx))
                    })?;
                }
                _ => {
                    return Err(JackError::Validation(vec![format!(
                        "cannot traverse scalar at segment '{}'",
                        seg
                    )]))
                }
            }
        }
        Ok(cur)
    }

    /// Install `value` at `segments`, creating intermediate objects as
    /// needed. Requires at least one segment.
    pub fn set_path(&mut self, segments: &[&str], value: Value) -> Result<()> {
        if segments.is_empty() {
            return Err(JackError::Validation(vec![
                "set requires at least one path segment".into(),
            ]));
        }
        let mut cur = self;
        for seg in &segments[..segments.len() - 1] {
            if !matches!(cur, Value::Object(_)) {
                *cur = Value::object();
            }
            let map = cur.as_object_mut().expect("just ensured object");
            cur = map.entry(seg.to_string()).or_insert_with(Value::object);
        }
        if !matches!(cur, Value::Object(_)) {
            *cur = Value::object();
        }
        let map = cur.as_object_mut().expect("just ensured object");
        map.insert(segments[segments.len() - 1].to_string(), value);
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_stable_text())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        v.to_json()
    }
}

/// Split a dot-path into its segments. Segments may contain any character
/// except `.`, so a plain split suffices — no escaping is supported or
/// required.
pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

/// CLI value coercion: `"true"`/`"false"` become bool, a bare decimal
/// integer becomes `Int`, anything else stays a string.
pub fn coerce_cli_string(s: &str) -> Value {
    match s {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if !s.is_empty() && s.chars().enumerate().all(|(i, c)| c.is_ascii_digit() || (i == 0 && c == '-')) {
        if let Ok(i) = s.parse::<i64>() {
            return Value::Int(i);
        }
    }
    Value::String(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_bool_and_int() {
        assert_eq!(coerce_cli_string("true"), Value::Bool(true));
        assert_eq!(coerce_cli_string("false"), Value::Bool(false));
        assert_eq!(coerce_cli_string("42"), Value::Int(42));
        assert_eq!(coerce_cli_string("-7"), Value::Int(-7));
        assert_eq!(coerce_cli_string("eth0"), Value::String("eth0".into()));
    }

    #[test]
    fn dot_path_injectivity() {
        let mut root = Value::object();
        root.set_path(&["interfaces", "br-lan", "ipaddr"], Value::String("1.1.1.1".into()))
            .unwrap();
        root.set_path(&["interfaces", "br-lan", "netmask"], Value::String("255.255.255.0".into()))
            .unwrap();
        assert_eq!(
            root.get_path(&["interfaces", "br-lan", "ipaddr"]).unwrap(),
            &Value::String("1.1.1.1".into())
        );
        assert_eq!(
            root.get_path(&["interfaces", "br-lan", "netmask"]).unwrap(),
            &Value::String("255.255.255.0".into())
        );
    }

    #[test]
    fn segments_allow_punctuation() {
        let mut root = Value::object();
        root.set_path(&["led", "status:green", "brightness"], Value::Int(5))
            .unwrap();
        assert_eq!(
            root.get_path(&["led", "status:green", "brightness"]).unwrap(),
            &Value::Int(5)
        );
    }

    #[test]
    fn traversal_through_scalar_is_type_error() {
        let mut root = Value::object();
        root.set_path(&["a", "b"], Value::Int(1)).unwrap();
        let err = root.get_path(&["a", "b", "c"]).unwrap_err();
        assert!(matches!(err, JackError::Validation(_)));
    }

    #[test]
    fn json_roundtrip_is_lossless() {
        let json = serde_json::json!({
            "a": 1, "b": [1, 2, "x"], "c": {"d": true, "e": null}
        });
        let v = Value::from_json(json.clone());
        assert_eq!(v.to_json(), json);
    }
}
