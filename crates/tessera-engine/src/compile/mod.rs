/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compilation of markup into unit trees.
//!
//! The compiler only needs the [`SourceNode`] view of a node: kind, local
//! name, namespace, attributes and children. [`tessera_markup`] elements
//! and nodes implement it.
//!
//! Compilation is a single pass. Each child is compiled on its own and then
//! offered to its parent's [`Unit::accept`]; rejected children are dropped.

pub mod defaults;

use crate::attributes::{Attributes, NODE_NAME, NODE_TYPE, NS_PREFIX, NS_URI};
use crate::engine::Services;
use crate::error::{EngineError, EngineResult};
use crate::unit::assert::Assert;
use crate::unit::blocks::Steps;
use crate::unit::condition::Condition;
use crate::unit::container::{Block, MapBlock};
use crate::unit::data::{Set, Unset, ValueOf, ValueUnit};
use crate::unit::extends::ExtendsLink;
use crate::unit::include::Include;
use crate::unit::log::Log;
use crate::unit::loops::Loop;
use crate::unit::text::Text;
use crate::unit::{Unit, UnitKind, UnitNode};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_markup::{Element, Node, NodeKind};

pub use defaults::{ConfigDefaults, Defaults, DefaultsQuery, DefaultsResolver};

/// Name of the document root whose element children are the top-level
/// units.
pub const TEMPLATE_TAG: &str = "template";

/// Attributes a text node takes from its parent element.
const INHERITED_BY_TEXT: [&str; 2] = ["eval", "trim"];

/// The node contract the compiler works against.
pub trait SourceNode {
    fn node_kind(&self) -> NodeKind;

    /// Local tag name. Empty for non-elements.
    fn local_name(&self) -> &str;

    fn prefix(&self) -> Option<&str>;

    fn namespace(&self) -> Option<&str>;

    /// Attribute name/value pairs, names qualified with their prefix.
    fn attribute_pairs(&self) -> Vec<(String, &str)>;

    /// Text content, for text nodes.
    fn text(&self) -> Option<&str>;

    fn child_nodes(&self) -> Vec<&dyn SourceNode>;
}

impl SourceNode for Element {
    fn node_kind(&self) -> NodeKind {
        NodeKind::Element
    }

    fn local_name(&self) -> &str {
        &self.name
    }

    fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn attribute_pairs(&self) -> Vec<(String, &str)> {
        self.attributes
            .iter()
            .map(|a| {
                let name = match &a.prefix {
                    Some(prefix) => format!("{}:{}", prefix, a.name),
                    None => a.name.clone(),
                };
                (name, a.value.as_str())
            })
            .collect()
    }

    fn text(&self) -> Option<&str> {
        None
    }

    fn child_nodes(&self) -> Vec<&dyn SourceNode> {
        self.children.iter().map(|c| c as &dyn SourceNode).collect()
    }
}

impl SourceNode for Node {
    fn node_kind(&self) -> NodeKind {
        self.kind()
    }

    fn local_name(&self) -> &str {
        self.as_element().map(|e| e.name.as_str()).unwrap_or("")
    }

    fn prefix(&self) -> Option<&str> {
        self.as_element().and_then(|e| e.prefix.as_deref())
    }

    fn namespace(&self) -> Option<&str> {
        self.as_element().and_then(|e| e.namespace.as_deref())
    }

    fn attribute_pairs(&self) -> Vec<(String, &str)> {
        self.as_element()
            .map(|e| e.attribute_pairs())
            .unwrap_or_default()
    }

    fn text(&self) -> Option<&str> {
        self.as_text()
    }

    fn child_nodes(&self) -> Vec<&dyn SourceNode> {
        self.as_element()
            .map(|e| e.child_nodes())
            .unwrap_or_default()
    }
}

/// Builds a unit from its compiled node.
pub type UnitFactory = Arc<dyn Fn(UnitNode) -> Box<dyn Unit> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    kind: UnitKind,
    factory: UnitFactory,
}

/// Tag to unit factory table.
#[derive(Clone)]
pub struct UnitRegistry {
    tags: HashMap<String, Registration>,
}

impl fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.tags.keys().collect();
        tags.sort();
        f.debug_struct("UnitRegistry").field("tags", &tags).finish()
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    /// A registry holding the built-in tags.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("block", Block::new);
        registry.register("map", MapBlock::new);
        registry.register("loop", Loop::new);
        registry.register("text", Text::element);
        registry.register("value", ValueUnit::new);
        registry.register("value-of", ValueOf::new);
        registry.register("set", Set::new);
        registry.register("unset", Unset::new);
        registry.register("log", Log::new);
        registry.register("assert", Assert::new);
        registry.register("include", Include::new);
        registry.register("extends", ExtendsLink::new);
        for kind in [
            UnitKind::On,
            UnitKind::Break,
            UnitKind::All,
            UnitKind::Any,
            UnitKind::Not,
        ] {
            registry.register(kind.name(), move |node| Condition::new(kind, node));
        }
        for kind in [UnitKind::Init, UnitKind::Final, UnitKind::Using] {
            registry.register(kind.name(), move |node| Steps::new(kind, node));
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            tags: HashMap::new(),
        }
    }

    /// Register a factory for `tag` (a local name or `prefix:name`).
    ///
    /// The unit kind is taken from a unit built on an empty node.
    pub fn register<U, F>(&mut self, tag: &str, factory: F)
    where
        U: Unit + 'static,
        F: Fn(UnitNode) -> U + Send + Sync + 'static,
    {
        let kind = factory(UnitNode::default()).kind();
        let factory: UnitFactory =
            Arc::new(move |node: UnitNode| -> Box<dyn Unit> { Box::new(factory(node)) });
        self.tags
            .insert(tag.to_string(), Registration { kind, factory });
    }

    /// Register an already boxed factory.
    pub fn register_boxed(&mut self, tag: &str, factory: UnitFactory) {
        let kind = factory(UnitNode::default()).kind();
        self.tags
            .insert(tag.to_string(), Registration { kind, factory });
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    /// Qualified name first, then the local name.
    fn lookup(&self, qualified: &str, local: &str) -> Option<&Registration> {
        self.tags.get(qualified).or_else(|| self.tags.get(local))
    }
}

/// Compiles source nodes against the services of an engine.
pub struct Compiler<'a> {
    services: &'a Services,
    origin: Option<Arc<str>>,
}

impl<'a> Compiler<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self {
            services,
            origin: None,
        }
    }

    /// Record `origin` as the template path on every compiled unit.
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(Arc::from(origin));
        self
    }

    /// Parse markup text and compile its top-level units.
    pub fn compile_str(&self, source: &str) -> EngineResult<Vec<Arc<dyn Unit>>> {
        let document = tessera_markup::parse(source).map_err(|source| EngineError::Markup {
            path: self
                .origin
                .as_deref()
                .unwrap_or("<inline>")
                .to_string(),
            source,
        })?;
        self.compile_root(&document.root)
    }

    /// A `template` root contributes its children; any other root is the
    /// single top-level unit.
    pub fn compile_root(&self, root: &dyn SourceNode) -> EngineResult<Vec<Arc<dyn Unit>>> {
        let nodes = if root.node_kind() == NodeKind::Element && root.local_name() == TEMPLATE_TAG {
            root.child_nodes()
        } else {
            vec![root]
        };
        let mut units = Vec::new();
        for node in nodes {
            if let Some(unit) = self.compile_node(node, None)? {
                units.push(Arc::from(unit));
            }
        }
        tracing::debug!(
            origin = self.origin.as_deref().unwrap_or("<inline>"),
            units = units.len(),
            "Compiled template"
        );
        Ok(units)
    }

    /// Compile one node. `None` means the node produces no unit (comments,
    /// blank text, skipped tags).
    pub fn compile(&self, node: &dyn SourceNode) -> EngineResult<Option<Box<dyn Unit>>> {
        self.compile_node(node, None)
    }

    fn compile_node(
        &self,
        node: &dyn SourceNode,
        parent: Option<&Attributes>,
    ) -> EngineResult<Option<Box<dyn Unit>>> {
        match node.node_kind() {
            NodeKind::Text => Ok(self.compile_text(node.text().unwrap_or(""), parent)),
            NodeKind::Element => self.compile_element(node, parent),
            NodeKind::Other => Ok(None),
        }
    }

    fn compile_text(&self, content: &str, parent: Option<&Attributes>) -> Option<Box<dyn Unit>> {
        let mut text = Text::new(content);
        if text.as_emptiable().is_some_and(|e| e.is_empty()) {
            return None;
        }
        if let Some(parent) = parent {
            for key in INHERITED_BY_TEXT {
                if let Some(value) = parent.get(key) {
                    text.node_mut().attributes_mut().insert(key, value);
                }
            }
        }
        text.node_mut().origin = self.origin.clone();
        Some(Box::new(text))
    }

    fn compile_element(
        &self,
        node: &dyn SourceNode,
        parent: Option<&Attributes>,
    ) -> EngineResult<Option<Box<dyn Unit>>> {
        let local = node.local_name();
        let qualified = match node.prefix() {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        };

        let Some(registration) = self.services.units.lookup(&qualified, local) else {
            if self.services.settings.lenient {
                tracing::warn!(tag = %qualified, "Skipping unknown tag");
                return Ok(None);
            }
            return Err(EngineError::UnknownTag { tag: qualified });
        };

        let authored = node.attribute_pairs();
        let extra = authored
            .iter()
            .find(|(k, _)| k == "use-defaults")
            .map(|(_, v)| *v);
        let defaults = self.services.defaults.defaults(&DefaultsQuery {
            name: local,
            kind: registration.kind,
            prefix: node.prefix(),
            namespace: node.namespace(),
            extra,
        });

        let mut attributes = defaults.values;
        for (key, value) in authored {
            if defaults.mergeable.contains(&key) {
                attributes.merge(key, value);
            } else {
                attributes.insert(key, value);
            }
        }
        if let (UnitKind::Text, Some(parent)) = (registration.kind, parent) {
            for key in INHERITED_BY_TEXT {
                if let (false, Some(value)) = (attributes.contains(key), parent.get(key)) {
                    attributes.insert(key, value);
                }
            }
        }
        attributes.insert(NODE_NAME, local);
        attributes.insert(NODE_TYPE, registration.kind.name());
        if let Some(prefix) = node.prefix() {
            attributes.insert(NS_PREFIX, prefix);
        }
        if let Some(namespace) = node.namespace() {
            attributes.insert(NS_URI, namespace);
        }

        let mut unit = (registration.factory)(UnitNode::new(qualified.as_str(), attributes));
        unit.node_mut().origin = self.origin.clone();

        for child in node.child_nodes() {
            let compiled = self.compile_node(child, Some(unit.node().attributes.as_ref()))?;
            let Some(compiled) = compiled else {
                continue;
            };
            if let Err(rejected) = unit.accept(compiled) {
                tracing::debug!(
                    parent = %qualified,
                    child = %rejected.kind(),
                    "Dropping child not accepted by parent"
                );
            }
        }
        Ok(Some(unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::Engine;
    use crate::unit::Shape;
    use pretty_assertions::assert_eq;

    fn compile(engine: &Engine, source: &str) -> Vec<Arc<dyn Unit>> {
        Compiler::new(engine.services()).compile_str(source).unwrap()
    }

    #[test]
    fn test_template_children_become_top_level_units() {
        let engine = Engine::builder().build();
        let units = compile(
            &engine,
            r#"<template>
                <!-- ignored -->
                <block id="a">x</block>
                <value id="b" value="1"/>
            </template>"#,
        );
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].kind(), UnitKind::Block);
        assert_eq!(units[0].node().attribute(NODE_NAME), Some("block"));
        assert_eq!(units[0].node().attribute(NODE_TYPE), Some("block"));
        assert_eq!(units[1].id_or_else(), Some("b"));
    }

    #[test]
    fn test_blank_text_is_elided_and_text_inherits() {
        let engine = Engine::builder().build();
        let units = compile(
            &engine,
            r#"<block eval="none" trim="false">
                <value value="v"/>
                hello ${x}
            </block>"#,
        );
        let block = &units[0];
        assert_eq!(block.node().children.len(), 2);
        let text = &block.node().children[1];
        assert_eq!(text.kind(), UnitKind::Text);
        assert_eq!(text.node().attribute("eval"), Some("none"));
        assert_eq!(text.node().attribute("trim"), Some("false"));
    }

    #[test]
    fn test_text_element_inherits_from_parent() {
        let engine = Engine::builder().build();
        let units = compile(
            &engine,
            r#"<template>
                <block id="raw" eval="none"><text>${x}</text></block>
                <block id="own" eval="none"><text eval="all">${x}</text></block>
            </template>"#,
        );
        let raw = &units[0].node().children[0];
        assert_eq!(raw.node().attribute("eval"), Some("none"));
        assert_eq!(raw.node().children[0].node().attribute("eval"), Some("none"));
        let own = &units[1].node().children[0];
        assert_eq!(own.node().attribute("eval"), Some("all"));

        let mut rt = engine.runtime();
        rt.set_var("x", crate::value::Value::Int(1));
        let value = crate::lifecycle::evaluate(raw.as_evaluable().unwrap(), &mut rt).unwrap();
        assert_eq!(value, crate::value::Value::from("${x}"));
    }

    #[test]
    fn test_slots_and_rejected_children() {
        let engine = Engine::builder().build();
        let units = compile(
            &engine,
            r#"<block>
                <on test="true"/>
                <init><set context="c" key="k" value="v"/></init>
                <using x="1"/>
                <break test="true"/>
                <text>t</text>
            </block>"#,
        );
        let node = units[0].node();
        assert!(node.guard.is_some());
        assert!(node.init.is_some());
        assert_eq!(node.using.len(), 1);
        // `break` is only accepted by loops.
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].kind(), UnitKind::Text);
    }

    #[test]
    fn test_unknown_tag_strict_and_lenient() {
        let engine = Engine::builder().build();
        let err = Compiler::new(engine.services())
            .compile_str("<block><bogus/></block>")
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTag { tag } if tag == "bogus"));

        let mut config = EngineConfig::default();
        config.engine.lenient = true;
        let engine = Engine::builder().with_config(config).build();
        let units = compile(&engine, "<block><bogus/>ok</block>");
        assert_eq!(units[0].node().children.len(), 1);
    }

    #[test]
    fn test_defaults_and_mergeable_attributes() {
        let config = EngineConfig::from_toml_str(
            r#"
            [defaults]
            mergeable = ["class"]
            [defaults.tag.block]
            class = "base"
            joiner = ";"
            "#,
        )
        .unwrap();
        let engine = Engine::builder().with_config(config).build();
        let units = compile(&engine, r#"<block class="wide" joiner="|"/>"#);
        let attrs = &units[0].node().attributes;
        assert_eq!(attrs.get("class"), Some("base wide"));
        assert_eq!(attrs.get("joiner"), Some("|"));
    }

    #[test]
    fn test_namespace_attributes() {
        let engine = Engine::builder().build();
        let units = compile(
            &engine,
            r#"<t:block xmlns:t="urn:tessera" id="n"/>"#,
        );
        let node = units[0].node();
        assert_eq!(node.tag, "t:block");
        assert_eq!(node.attribute(NS_PREFIX), Some("t"));
        assert_eq!(node.attribute(NS_URI), Some("urn:tessera"));
    }

    #[test]
    fn test_compiling_twice_gives_equal_independent_trees() {
        let engine = Engine::builder().build();
        let source = r#"<template>
            <block id="page"><on test="true"/><value id="v" value="1"/>text</block>
        </template>"#;
        let first = compile(&engine, source);
        let second = compile(&engine, source);
        assert_eq!(Shape::of(first[0].as_ref()), Shape::of(second[0].as_ref()));
        assert!(!Arc::ptr_eq(&first[0], &second[0]));
        assert!(!Arc::ptr_eq(
            &first[0].node().children[0],
            &second[0].node().children[0]
        ));
    }
}
