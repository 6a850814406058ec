//! Property-list values for persisted bindings.
//!
//! Bindings persist as a tree of string-keyed dictionaries whose leaves are
//! strings or numbers. [`PlistValue`] is that tree as a closed enum; it
//! serializes untagged, so the JSON on disk is plain objects, strings and
//! numbers.
//!
//! Any other JSON node (booleans, null, arrays) parses as
//! [`PlistValue::Unsupported`] instead of failing the whole document, so
//! loaders can skip that one entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type PlistDictionary = BTreeMap<String, PlistValue>;

/// One node of a property list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlistValue {
    String(String),
    Integer(i64),
    Real(f64),
    Dictionary(PlistDictionary),
    /// A node with no property-list counterpart, kept as read.
    Unsupported(serde_json::Value),
}

impl PlistValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PlistValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PlistValue::Integer(i) => Some(*i),
            PlistValue::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            PlistValue::Integer(i) => Some(*i as f64),
            PlistValue::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&PlistDictionary> {
        match self {
            PlistValue::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PlistValue::String(_) => "string",
            PlistValue::Integer(_) => "integer",
            PlistValue::Real(_) => "real",
            PlistValue::Dictionary(_) => "dictionary",
            PlistValue::Unsupported(serde_json::Value::Bool(_)) => "boolean",
            PlistValue::Unsupported(serde_json::Value::Null) => "null",
            PlistValue::Unsupported(serde_json::Value::Array(_)) => "array",
            PlistValue::Unsupported(_) => "unsupported",
        }
    }
}

impl From<String> for PlistValue {
    fn from(s: String) -> Self {
        PlistValue::String(s)
    }
}

impl From<&str> for PlistValue {
    fn from(s: &str) -> Self {
        PlistValue::String(s.to_string())
    }
}

impl From<i64> for PlistValue {
    fn from(i: i64) -> Self {
        PlistValue::Integer(i)
    }
}

impl From<f64> for PlistValue {
    fn from(r: f64) -> Self {
        PlistValue::Real(r)
    }
}

impl From<PlistDictionary> for PlistValue {
    fn from(d: PlistDictionary) -> Self {
        PlistValue::Dictionary(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_shape() {
        let mut inner = PlistDictionary::new();
        inner.insert("Up".into(), "key:82:on".into());
        inner.insert("A".into(), 4i64.into());
        let mut outer = PlistDictionary::new();
        outer.insert("1".into(), inner.into());
        let json = serde_json::to_string(&PlistValue::Dictionary(outer.clone())).unwrap();
        assert_eq!(json, r#"{"1":{"A":4,"Up":"key:82:on"}}"#);

        let back: PlistValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PlistValue::Dictionary(outer));
    }

    #[test]
    fn numbers_keep_their_kind() {
        let v: PlistValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, PlistValue::Integer(3));
        let v: PlistValue = serde_json::from_str("0.25").unwrap();
        assert_eq!(v.as_real(), Some(0.25));
        assert_eq!(v.as_integer(), None);
    }

    #[test]
    fn foreign_nodes_do_not_fail_the_document() {
        let v: PlistValue = serde_json::from_str(r#"{"a":{"b":true,"c":"x"},"d":null,"e":[1,2]}"#).unwrap();
        let dict = v.as_dictionary().unwrap();
        let a = dict["a"].as_dictionary().unwrap();
        assert_eq!(a["b"].kind_name(), "boolean");
        assert_eq!(a["c"].as_str(), Some("x"));
        assert_eq!(dict["d"].kind_name(), "null");
        assert_eq!(dict["e"].kind_name(), "array");
        assert_eq!(dict["e"].as_dictionary(), None);
    }
}
