/*
 * data.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Units that produce or move data: `value`, `value-of`, `set`, `unset`.

use super::{Evaluable, Executable, Satisfiable, Unit, UnitKind, UnitNode, unit_node_impl};
use crate::context::RuntimeContext;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle;
use crate::value::Value;

/// A literal or computed value.
///
/// The `value` attribute wins over the text children. `type` casts the
/// result (`int`, `float`, `bool`, `string`, `json`); a failed cast gives
/// null.
#[derive(Debug, Clone)]
pub struct ValueUnit {
    node: UnitNode,
}

impl ValueUnit {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }
}

impl Unit for ValueUnit {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Value
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind.is_value()
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }
}

impl Satisfiable for ValueUnit {}

impl Evaluable for ValueUnit {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let value = match self.node.eval_attribute("value", rt)? {
            Some(value) => value,
            None => lifecycle::collapse(
                lifecycle::emitted(&self.node.children, rt)?
                    .into_iter()
                    .map(|(_, v)| v)
                    .collect(),
            ),
        };
        Ok(match self.node.attribute("type") {
            Some(kind) => cast(value, kind.trim()),
            None => value,
        })
    }
}

fn cast(value: Value, kind: &str) -> Value {
    if value.is_null() {
        return value;
    }
    match kind {
        "int" => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
            .map(Value::Int)
            .unwrap_or_default(),
        "float" => value.as_f64().map(Value::Float).unwrap_or_default(),
        "bool" => Value::Bool(value.is_truthy()),
        "string" => Value::String(value.to_text()),
        "json" => match &value {
            Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(|json| Value::from_json(&json))
                .unwrap_or_default(),
            _ => value,
        },
        other => {
            tracing::debug!(cast = other, "Unknown value type, leaving value as is");
            value
        }
    }
}

/// Reads `key` from the external map `context`, or the internal variable
/// named by `var`. `path` walks into the value (`lines.0.sku`).
#[derive(Debug, Clone)]
pub struct ValueOf {
    node: UnitNode,
}

impl ValueOf {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }
}

impl Unit for ValueOf {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::ValueOf
    }

    fn fallback_id_key(&self) -> Option<&'static str> {
        Some("key")
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }
}

impl Satisfiable for ValueOf {}

impl Evaluable for ValueOf {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let found = if let Some(var) = self.node.computed_attribute("var", rt) {
            rt.var(&var).cloned()
        } else {
            let context = required(&self.node, "context", rt)?;
            let key = required(&self.node, "key", rt)?;
            rt.read(&context, &key).cloned()
        };
        let Some(found) = found else {
            return Ok(Value::Null);
        };
        match self.node.computed_attribute("path", rt) {
            Some(path) => {
                let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
                Ok(found.get_path(&segments).cloned().unwrap_or_default())
            }
            None => Ok(found),
        }
    }
}

fn required(node: &UnitNode, key: &str, rt: &RuntimeContext) -> EngineResult<String> {
    node.computed_attribute(key, rt)
        .ok_or_else(|| EngineError::InvalidAttribute {
            tag: node.tag.clone(),
            attribute: key.to_string(),
            message: "attribute is required".to_string(),
        })
}

/// Writes a value into an external map.
///
/// The value comes from the `value` attribute, or from the first candidate
/// child that yields non-null. With `break-on-first="false"` every
/// candidate is evaluated and their values are combined. The key is `key`,
/// falling back to the computed id. `create` auto-creates a missing map;
/// `emit` makes the written value the unit's own value.
#[derive(Debug, Clone)]
pub struct Set {
    node: UnitNode,
}

impl Set {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }

    fn candidate_value(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        if let Some(value) = self.node.eval_attribute("value", rt)? {
            return Ok(value);
        }
        let break_on_first = self.node.attributes.flag("break-on-first", true);
        let mut found = Vec::new();
        for child in &self.node.children {
            let Some(candidate) = child.as_evaluable() else {
                continue;
            };
            let value = lifecycle::evaluate(candidate, rt)?;
            if value.is_null() {
                continue;
            }
            found.push(value);
            if break_on_first {
                break;
            }
        }
        Ok(lifecycle::collapse(found))
    }
}

impl Unit for Set {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Set
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind.is_value()
    }

    fn fallback_id_key(&self) -> Option<&'static str> {
        Some("key")
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

impl Satisfiable for Set {}

impl Evaluable for Set {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let context = required(&self.node, "context", rt)?;
        let key = self
            .node
            .computed_attribute("key", rt)
            .or_else(|| self.computed_id(rt))
            .ok_or_else(|| EngineError::InvalidAttribute {
                tag: self.node.tag.clone(),
                attribute: "key".to_string(),
                message: "set needs a key or an id".to_string(),
            })?;

        let value = self.candidate_value(rt)?;
        if value.is_null() {
            tracing::trace!(context = %context, key = %key, "Nothing to set");
            return Ok(Value::Null);
        }

        let create = self.node.attributes.flag("create", false);
        rt.write(&context, &key, value.clone(), create)?;

        if self.node.attributes.flag("emit", false) {
            Ok(value)
        } else {
            Ok(Value::Null)
        }
    }
}

impl Executable for Set {}

/// Removes `key` from the external map `context`.
#[derive(Debug, Clone)]
pub struct Unset {
    node: UnitNode,
}

impl Unset {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }
}

impl Unit for Unset {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Unset
    }

    fn fallback_id_key(&self) -> Option<&'static str> {
        Some("key")
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

impl Satisfiable for Unset {}

impl Evaluable for Unset {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let context = required(&self.node, "context", rt)?;
        let key = self
            .node
            .computed_attribute("key", rt)
            .or_else(|| self.computed_id(rt))
            .ok_or_else(|| EngineError::InvalidAttribute {
                tag: self.node.tag.clone(),
                attribute: "key".to_string(),
                message: "unset needs a key or an id".to_string(),
            })?;
        rt.remove(&context, &key)?;
        Ok(Value::Null)
    }
}

impl Executable for Unset {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::engine::Engine;
    use crate::lifecycle::evaluate;
    use crate::unit::text::Text;
    use std::sync::Arc;

    fn node(tag: &str, attrs: &[(&str, &str)]) -> UnitNode {
        UnitNode::new(tag, attrs.iter().copied().collect::<Attributes>())
    }

    #[test]
    fn test_value_casts() {
        let mut rt = Engine::builder().build().runtime();
        let unit = ValueUnit::new(node("value", &[("value", "42"), ("type", "int")]));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::Int(42));

        let unit = ValueUnit::new(node("value", &[("value", "4x"), ("type", "int")]));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::Null);

        let unit = ValueUnit::new(node("value", &[("value", r#"{"a":[1]}"#), ("type", "json")]));
        assert_eq!(
            evaluate(&unit, &mut rt).unwrap(),
            Value::from_json(&serde_json::json!({"a": [1]}))
        );
    }

    #[test]
    fn test_value_from_text_children() {
        let mut rt = Engine::builder().build().runtime();
        let mut unit = ValueUnit::new(node("value", &[]));
        unit.node_mut().children.push(Arc::new(Text::new("\n  hi\n")));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::from("hi"));
    }

    #[test]
    fn test_value_of_reads_context_and_var() {
        let mut rt = Engine::builder().build().runtime();
        rt.write(
            "input",
            "order",
            Value::from_json(&serde_json::json!({"lines": [{"sku": "A1"}]})),
            true,
        )
        .unwrap();
        rt.set_var("x", Value::Int(5));

        let unit = ValueOf::new(node(
            "value-of",
            &[("context", "input"), ("key", "order"), ("path", "lines.0.sku")],
        ));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::from("A1"));

        let unit = ValueOf::new(node("value-of", &[("var", "x")]));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::Int(5));

        let unit = ValueOf::new(node("value-of", &[("context", "input"), ("key", "nope")]));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::Null);
    }

    #[test]
    fn test_set_writes_and_requires_map() {
        let mut rt = Engine::builder().build().runtime();
        let unit = Set::new(node("set", &[("context", "out"), ("key", "k"), ("value", "v")]));
        assert!(matches!(
            evaluate(&unit, &mut rt),
            Err(EngineError::MissingContext { .. })
        ));

        let unit = Set::new(node(
            "set",
            &[("context", "out"), ("key", "k"), ("value", "v"), ("create", "true")],
        ));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::Null);
        assert_eq!(rt.read("out", "k"), Some(&Value::from("v")));
    }

    #[test]
    fn test_set_key_falls_back_to_computed_id() {
        let mut rt = Engine::builder().build().runtime();
        rt.set_var("n", Value::Int(2));
        let unit = Set::new(node(
            "set",
            &[("id", "row${n}"), ("context", "out"), ("value", "x"), ("create", "true"), ("emit", "true")],
        ));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::from("x"));
        assert_eq!(rt.read("out", "row2"), Some(&Value::from("x")));
        // Published under the computed id as well.
        assert_eq!(rt.var("row2"), Some(&Value::from("x")));
    }

    #[test]
    fn test_unset_removes_key() {
        let mut rt = Engine::builder().build().runtime();
        rt.write("out", "k", Value::Int(1), true).unwrap();
        let unit = Unset::new(node("unset", &[("context", "out"), ("key", "k")]));
        evaluate(&unit, &mut rt).unwrap();
        assert_eq!(rt.read("out", "k"), None);
    }
}
