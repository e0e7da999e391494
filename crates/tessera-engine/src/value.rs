/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Dynamic values produced and consumed by units.
//!
//! [`Value`] distinguishes three collection shapes because the loop engine
//! iterates each one differently: a [`Value::List`] is an indexable array,
//! a [`Value::Seq`] is an ordered sequence that can only be walked front to
//! back, and a [`Value::Map`] is iterated entry by entry.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A value flowing through evaluation.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// A null/missing value.
    #[default]
    Null,

    /// A boolean value.
    Bool(bool),

    /// An integer value.
    Int(i64),

    /// A floating point value.
    Float(f64),

    /// A string value.
    String(String),

    /// An indexable array of values.
    List(Vec<Value>),

    /// An ordered sequence walked through an iterator.
    Seq(Sequence),

    /// An insertion-ordered map of string keys to values.
    Map(IndexMap<String, Value>),
}

/// Source of items for a [`Sequence`].
///
/// Implementations must be finite; the loop engine and the text form both
/// walk the sequence to its end.
pub trait SequenceSource: fmt::Debug + Send + Sync {
    fn items(&self) -> Box<dyn Iterator<Item = Value> + '_>;
}

/// A shared handle to an ordered, non-indexable collection.
#[derive(Debug, Clone)]
pub struct Sequence(Arc<dyn SequenceSource>);

impl Sequence {
    pub fn new(source: impl SequenceSource + 'static) -> Self {
        Sequence(Arc::new(source))
    }

    /// Walk the sequence from the front.
    pub fn iter(&self) -> Box<dyn Iterator<Item = Value> + '_> {
        self.0.items()
    }

    /// A numeric range `start..end` advancing by `step`.
    ///
    /// A zero step yields an empty sequence.
    pub fn range(start: i64, end: i64, step: i64) -> Self {
        Sequence::new(RangeSource { start, end, step })
    }

    /// A sequence over already materialized items.
    pub fn from_values(items: Vec<Value>) -> Self {
        Sequence::new(VecSource(items))
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.iter().eq(other.iter())
    }
}

#[derive(Debug)]
struct RangeSource {
    start: i64,
    end: i64,
    step: i64,
}

impl SequenceSource for RangeSource {
    fn items(&self) -> Box<dyn Iterator<Item = Value> + '_> {
        let (start, end, step) = (self.start, self.end, self.step);
        let mut current = start;
        Box::new(std::iter::from_fn(move || {
            let more = (step > 0 && current < end) || (step < 0 && current > end);
            if !more {
                return None;
            }
            let item = current;
            current += step;
            Some(Value::Int(item))
        }))
    }
}

#[derive(Debug)]
struct VecSource(Vec<Value>);

impl SequenceSource for VecSource {
    fn items(&self) -> Box<dyn Iterator<Item = Value> + '_> {
        Box::new(self.0.iter().cloned())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Check if this value is "truthy" for conditions.
    ///
    /// Falsy values: null, `false`, zero, the empty string, the string
    /// `"false"`, and empty collections. Everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty() && s != "false",
            Value::List(items) => !items.is_empty(),
            Value::Seq(seq) => seq.iter().next().is_some(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A short name for the value's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "map",
        }
    }

    /// Render this value as text.
    ///
    /// - Null: ""
    /// - Float: integral values drop the fraction (`2.0` renders as `2`)
    /// - List/Seq: items joined with `,`
    /// - Map: compact JSON
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => s.clone(),
            Value::List(items) => join_text(items.iter()),
            Value::Seq(seq) => {
                let items: Vec<Value> = seq.iter().collect();
                join_text(items.iter())
            }
            Value::Map(_) => self.to_json().to_string(),
        }
    }

    /// Integer view of this value. Strings are parsed; failures give `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view of this value. Strings are parsed; failures give `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get a nested field by path.
    ///
    /// Map segments are looked up by key; list segments must parse as an
    /// index.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        match self {
            Value::Map(m) => m.get(*first).and_then(|v| v.get_path(rest)),
            Value::List(items) => first
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .and_then(|v| v.get_path(rest)),
            _ => None,
        }
    }

    /// Convert into a JSON value. Sequences are materialized as arrays.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Seq(seq) => serde_json::Value::Array(seq.iter().map(|v| v.to_json()).collect()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Convert from a JSON value. Arrays become lists.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn join_text<'a>(items: impl Iterator<Item = &'a Value>) -> String {
    items.map(Value::to_text).collect::<Vec<_>>().join(",")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::from("hello").is_truthy());
        assert!(!Value::from("false").is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(3).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Seq(Sequence::range(0, 0, 1)).is_truthy());
        assert!(Value::Seq(Sequence::range(0, 1, 1)).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_text_form() {
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::Float(2.0).to_text(), "2");
        assert_eq!(Value::Float(2.5).to_text(), "2.5");
        assert_eq!(
            Value::List(vec![Value::from("a"), Value::Int(1)]).to_text(),
            "a,1"
        );
        let mut map = IndexMap::new();
        map.insert("k".to_string(), Value::Int(1));
        assert_eq!(Value::Map(map).to_text(), r#"{"k":1}"#);
    }

    #[test]
    fn test_range_sequence() {
        let up: Vec<Value> = Sequence::range(0, 3, 1).iter().collect();
        assert_eq!(up, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);

        let down: Vec<Value> = Sequence::range(3, 0, -1).iter().collect();
        assert_eq!(down, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);

        assert_eq!(Sequence::range(0, 5, 0).iter().count(), 0);
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::from(" 42 ").as_i64(), Some(42));
        assert_eq!(Value::from("4x").as_i64(), None);
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::from("1.5").as_f64(), Some(1.5));
        assert_eq!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_get_path() {
        let json = serde_json::json!({"order": {"lines": [{"sku": "A1"}]}});
        let value = Value::from_json(&json);
        assert_eq!(
            value.get_path(&["order", "lines", "0", "sku"]),
            Some(&Value::from("A1"))
        );
        assert_eq!(value.get_path(&["order", "missing"]), None);
    }

    #[test]
    fn test_json_conversion_preserves_order() {
        let json = serde_json::json!({"b": 1, "a": [true, null, 1.5]});
        let value = Value::from_json(&json);
        match &value {
            Value::Map(m) => {
                let keys: Vec<&String> = m.keys().collect();
                assert_eq!(keys.len(), 2);
            }
            other => panic!("expected map, got {:?}", other),
        }
        assert_eq!(value.to_json(), json);
    }
}
