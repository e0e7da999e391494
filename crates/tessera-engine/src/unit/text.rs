/*
 * text.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Text units: markup text nodes and `<text>` elements.

use super::{Emptiable, Evaluable, Satisfiable, Unit, UnitKind, UnitNode, unit_node_impl};
use crate::attributes::{Attributes, NODE_NAME, NODE_TYPE};
use crate::context::RuntimeContext;
use crate::error::EngineResult;
use crate::lifecycle;
use crate::value::Value;

/// A run of text. Its content is a template evaluated at the unit's
/// `eval` extent.
///
/// Text compiled from a `<text>` element has no content of its own; its
/// value is the concatenation of its text children.
#[derive(Debug, Clone)]
pub struct Text {
    node: UnitNode,
    content: String,
}

impl Text {
    /// A text unit with no inherited attributes.
    pub fn new(content: impl Into<String>) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(NODE_NAME, "#text");
        attributes.insert(NODE_TYPE, UnitKind::Text.name());
        Self::with_node(UnitNode::new("#text", attributes), content)
    }

    pub fn with_node(node: UnitNode, content: impl Into<String>) -> Self {
        Self {
            node,
            content: content.into(),
        }
    }

    /// Unit for a `<text>` element.
    pub fn element(node: UnitNode) -> Self {
        Self::with_node(node, String::new())
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

impl Unit for Text {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Text
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind == UnitKind::Text
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }

    fn as_emptiable(&self) -> Option<&dyn Emptiable> {
        Some(self)
    }
}

impl Satisfiable for Text {}

impl Evaluable for Text {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let text = if self.content.is_empty() {
            let values: Vec<Value> = lifecycle::emitted(&self.node.children, rt)?
                .into_iter()
                .map(|(_, v)| v)
                .collect();
            lifecycle::concat(&values)
        } else {
            self.content.clone()
        };
        let text = match self.node.attribute("trim") {
            Some(_) if self.node.attributes.flag("trim", false) => text.trim().to_string(),
            Some(_) => text,
            None => strip_layout(&text).to_string(),
        };
        Ok(Value::String(text))
    }

    fn own_template(&self, value: &Value) -> Option<String> {
        if self.content.is_empty() {
            return None;
        }
        value.as_str().map(str::to_string)
    }
}

/// Drop leading and trailing whitespace runs that contain a line break.
/// Spaces next to inline units stay.
fn strip_layout(text: &str) -> &str {
    let start = text.trim_start();
    let text = if text[..text.len() - start.len()].contains('\n') {
        start
    } else {
        text
    };
    let end = text.trim_end();
    if text[end.len()..].contains('\n') {
        end
    } else {
        text
    }
}

impl Emptiable for Text {
    fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.node.children.is_empty()
    }
}
