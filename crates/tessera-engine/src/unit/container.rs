/*
 * container.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Container units: `block` and `map`.

use super::{Evaluable, Executable, Satisfiable, Unit, UnitKind, UnitNode, unit_node_impl};
use crate::context::RuntimeContext;
use crate::error::EngineResult;
use crate::lifecycle;
use crate::value::Value;
use indexmap::IndexMap;

/// Concatenates the text of its children.
#[derive(Debug, Clone)]
pub struct Block {
    node: UnitNode,
}

impl Block {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }
}

impl Unit for Block {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Block
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind.is_value()
    }

    fn is_container(&self) -> bool {
        true
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

impl Satisfiable for Block {}

impl Evaluable for Block {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let values: Vec<Value> = lifecycle::emitted(&self.node.children, rt)?
            .into_iter()
            .map(|(_, value)| value)
            .collect();
        Ok(Value::String(lifecycle::concat(&values)))
    }

    fn no_value(&self) -> Value {
        Value::String(String::new())
    }
}

impl Executable for Block {}

/// Builds a map of child id to child value.
///
/// `from` seeds the map with a copy of an external map. The result is
/// handed to a serializer when one is named by the `serializer` attribute
/// or the `serializer` internal variable.
#[derive(Debug, Clone)]
pub struct MapBlock {
    node: UnitNode,
}

impl MapBlock {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }

    fn serializer_name(&self, rt: &RuntimeContext) -> Option<String> {
        self.node
            .computed_attribute("serializer", rt)
            .or_else(|| rt.var("serializer").map(Value::to_text))
            .filter(|name| !name.is_empty())
    }
}

impl Unit for MapBlock {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Map
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind.is_value()
    }

    fn is_container(&self) -> bool {
        true
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }
}

impl Satisfiable for MapBlock {}

impl Evaluable for MapBlock {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let mut entries = match self.node.computed_attribute("from", rt) {
            Some(name) => rt.external().get(&name).cloned().unwrap_or_else(|| {
                tracing::debug!(context = %name, "Map source context not found");
                IndexMap::new()
            }),
            None => IndexMap::new(),
        };

        for (child, value) in lifecycle::emitted(&self.node.children, rt)? {
            match child.computed_id(rt) {
                Some(key) => {
                    entries.insert(key, value);
                }
                None => {
                    tracing::debug!(unit = %child.kind(), "Skipping map entry without id");
                }
            }
        }

        let value = Value::Map(entries);
        match self.serializer_name(rt) {
            Some(name) => rt
                .services()
                .clone()
                .serializers
                .serialize(&name, rt, self, &value),
            None => Ok(value),
        }
    }

    fn no_value(&self) -> Value {
        Value::String(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::engine::Engine;
    use crate::lifecycle::evaluate;
    use crate::unit::data::ValueUnit;
    use crate::unit::text::Text;
    use std::sync::Arc;

    fn value(id: &str, v: &str) -> Arc<dyn Unit> {
        Arc::new(ValueUnit::new(UnitNode::new(
            "value",
            [("id", id), ("value", v)].into_iter().collect(),
        )))
    }

    #[test]
    fn test_block_concatenates_text() {
        let mut rt = Engine::builder().build().runtime();
        let mut block = Block::new(UnitNode::new("block", Attributes::new()));
        block.node_mut().children.push(Arc::new(Text::new("a")));
        block.node_mut().children.push(value("x", "1"));
        block.node_mut().children.push(Arc::new(Text::new("b")));
        assert_eq!(evaluate(&block, &mut rt).unwrap(), Value::from("a1b"));
    }

    #[test]
    fn test_map_collects_children_by_id() {
        let mut rt = Engine::builder().build().runtime();
        rt.write("seed", "base", Value::Int(0), true).unwrap();

        let mut map = MapBlock::new(UnitNode::new(
            "map",
            [("from", "seed")].into_iter().collect(),
        ));
        map.node_mut().children.push(value("a", "1"));
        map.node_mut().children.push(value("b", "two"));

        let result = evaluate(&map, &mut rt).unwrap();
        let expected = Value::from_json(&serde_json::json!({"base": 0, "a": "1", "b": "two"}));
        assert_eq!(result, expected);
    }

    #[test]
    fn test_map_serializer_from_scope() {
        let mut rt = Engine::builder().build().runtime();
        rt.set_var("serializer", Value::from("json"));
        let mut map = MapBlock::new(UnitNode::new("map", Attributes::new()));
        map.node_mut().children.push(value("a", "1"));
        assert_eq!(evaluate(&map, &mut rt).unwrap(), Value::from(r#"{"a":"1"}"#));
    }
}
