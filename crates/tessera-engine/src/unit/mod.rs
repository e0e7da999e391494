/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The unit model.
//!
//! A compiled program is a tree of units. Every unit kind implements
//! [`Unit`] (structure and identity) plus a selection of capability traits:
//!
//! - [`Evaluable`]: produces a value through [`crate::lifecycle::evaluate`]
//! - [`Satisfiable`]: guarded by an optional `on` condition
//! - [`Conditional`]: a boolean match against the runtime context
//! - [`Executable`]: evaluated for its side effect
//! - [`Emptiable`]: may be elided when structurally empty
//!
//! Callers ask for a capability with `as_evaluable()` and friends instead
//! of downcasting. A unit is extensible when its node carries `extends`
//! links.
//!
//! Units are immutable after compilation. The only exception is the
//! [`ExtensionCache`] on each node, which records the outcome of extension
//! resolution. Children are shared through `Arc`, so cloning a unit
//! (see [`Unit::duplicate`]) is shallow: the clone can edit its own child
//! list and slots without touching the original.

pub mod assert;
pub mod blocks;
pub mod condition;
pub mod container;
pub mod data;
pub mod extends;
pub mod include;
pub mod log;
pub mod loops;
pub mod text;

use crate::attributes::{Attributes, ID};
use crate::context::RuntimeContext;
use crate::error::EngineResult;
use crate::expr::{self, EvalContext, Extent};
use crate::lifecycle;
use crate::value::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// The kind of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Template,
    Block,
    Map,
    Loop,
    Text,
    Value,
    ValueOf,
    Set,
    Unset,
    Log,
    Assert,
    Include,
    Extends,
    On,
    Break,
    All,
    Any,
    Not,
    Init,
    Final,
    Using,
    /// A kind registered through the plugin API.
    Custom(&'static str),
}

impl UnitKind {
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::Template => "template",
            UnitKind::Block => "block",
            UnitKind::Map => "map",
            UnitKind::Loop => "loop",
            UnitKind::Text => "text",
            UnitKind::Value => "value",
            UnitKind::ValueOf => "value-of",
            UnitKind::Set => "set",
            UnitKind::Unset => "unset",
            UnitKind::Log => "log",
            UnitKind::Assert => "assert",
            UnitKind::Include => "include",
            UnitKind::Extends => "extends",
            UnitKind::On => "on",
            UnitKind::Break => "break",
            UnitKind::All => "all",
            UnitKind::Any => "any",
            UnitKind::Not => "not",
            UnitKind::Init => "init",
            UnitKind::Final => "final",
            UnitKind::Using => "using",
            UnitKind::Custom(name) => *name,
        }
    }

    /// Kinds that produce values inside a body.
    pub fn is_value(&self) -> bool {
        matches!(
            self,
            UnitKind::Block
                | UnitKind::Map
                | UnitKind::Loop
                | UnitKind::Text
                | UnitKind::Value
                | UnitKind::ValueOf
                | UnitKind::Set
                | UnitKind::Unset
                | UnitKind::Log
                | UnitKind::Assert
                | UnitKind::Include
                | UnitKind::Custom(_)
        )
    }

    /// Boolean condition kinds.
    pub fn is_condition(&self) -> bool {
        matches!(
            self,
            UnitKind::On | UnitKind::Break | UnitKind::All | UnitKind::Any | UnitKind::Not
        )
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of extension resolution, recorded on the canonical unit.
#[derive(Debug, Default)]
pub struct ExtensionCache {
    processed: AtomicBool,
    resolved: OnceLock<Arc<dyn Unit>>,
}

impl ExtensionCache {
    /// True once resolution has been proven context-independent.
    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    /// The cached resolved clone. `None` on a processed unit means the
    /// unit resolves to itself.
    pub fn resolved(&self) -> Option<&Arc<dyn Unit>> {
        self.resolved.get()
    }

    pub(crate) fn store(&self, resolved: Option<Arc<dyn Unit>>) {
        if let Some(resolved) = resolved {
            let _ = self.resolved.set(resolved);
        }
        self.processed.store(true, Ordering::Release);
    }
}

/// Structure shared by every unit kind.
#[derive(Debug, Default)]
pub struct UnitNode {
    /// Qualified source tag (`prefix:name` or `name`).
    pub tag: String,
    pub attributes: Arc<Attributes>,
    pub children: Vec<Arc<dyn Unit>>,
    /// The `on` guard.
    pub guard: Option<Arc<dyn Unit>>,
    pub init: Option<Arc<dyn Unit>>,
    pub finalizer: Option<Arc<dyn Unit>>,
    pub using: Vec<Arc<dyn Unit>>,
    pub extends: Vec<Arc<dyn Unit>>,
    /// Path of the template the unit was compiled from.
    pub origin: Option<Arc<str>>,
    cache: ExtensionCache,
}

impl Clone for UnitNode {
    /// Shallow copy with a fresh extension cache.
    fn clone(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            attributes: Arc::clone(&self.attributes),
            children: self.children.clone(),
            guard: self.guard.clone(),
            init: self.init.clone(),
            finalizer: self.finalizer.clone(),
            using: self.using.clone(),
            extends: self.extends.clone(),
            origin: self.origin.clone(),
            cache: ExtensionCache::default(),
        }
    }
}

impl UnitNode {
    pub fn new(tag: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            tag: tag.into(),
            attributes: Arc::new(attributes),
            ..Default::default()
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key)
    }

    /// Mutable attributes, copied first if shared with another unit.
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        Arc::make_mut(&mut self.attributes)
    }

    pub fn cache(&self) -> &ExtensionCache {
        &self.cache
    }

    pub fn is_extensible(&self) -> bool {
        !self.extends.is_empty()
    }

    /// Child lookup by raw identifier.
    pub fn child(&self, id: &str) -> Option<&Arc<dyn Unit>> {
        self.children.iter().find(|c| c.id_or_else() == Some(id))
    }

    pub fn children_of_kind(&self, kind: UnitKind) -> impl Iterator<Item = &Arc<dyn Unit>> {
        self.children.iter().filter(move |c| c.kind() == kind)
    }

    pub fn eval_context<'a>(&'a self, rt: &'a RuntimeContext) -> EvalContext<'a> {
        EvalContext::for_unit(self, rt)
    }

    /// Best-effort computed attribute: the evaluated value, or the raw
    /// text when evaluation fails or yields null.
    pub fn computed_value(&self, key: &str, rt: &RuntimeContext) -> Option<Value> {
        let raw = self.attribute(key)?;
        let (value, _) = expr::evaluate_or_raw(raw, &self.eval_context(rt));
        Some(value)
    }

    /// Text form of [`computed_value`](Self::computed_value).
    pub fn computed_attribute(&self, key: &str, rt: &RuntimeContext) -> Option<String> {
        self.computed_value(key, rt).map(|v| v.to_text())
    }

    /// Evaluate an attribute whose value is essential. Errors propagate.
    pub fn eval_attribute(&self, key: &str, rt: &RuntimeContext) -> EngineResult<Option<Value>> {
        match self.attribute(key) {
            Some(raw) => {
                expr::evaluate_template(raw, Extent::Full, &self.eval_context(rt)).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn is_dynamic_attribute(&self, key: &str) -> bool {
        self.attribute(key).is_some_and(expr::is_dynamic)
    }
}

/// Structure and identity of a unit.
pub trait Unit: fmt::Debug + Send + Sync {
    fn node(&self) -> &UnitNode;

    fn node_mut(&mut self) -> &mut UnitNode;

    fn kind(&self) -> UnitKind;

    /// Shallow clone with a fresh extension cache.
    fn duplicate(&self) -> Box<dyn Unit>;

    /// Which child kinds go to the ordered child list.
    fn accepts(&self, _kind: UnitKind) -> bool {
        false
    }

    /// Attribute used as identifier when `id` is absent.
    fn fallback_id_key(&self) -> Option<&'static str> {
        None
    }

    /// Containers merge structurally during extension.
    fn is_container(&self) -> bool {
        false
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        None
    }

    fn as_conditional(&self) -> Option<&dyn Conditional> {
        None
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        None
    }

    fn as_emptiable(&self) -> Option<&dyn Emptiable> {
        None
    }

    /// Place a compiled child in a slot or the child list.
    ///
    /// Units with a lifecycle take the first `on` as guard, `init`,
    /// `final`, `using` and `extends` children as slots. The child comes
    /// back as `Err` when it is not recognized.
    fn accept(&mut self, child: Box<dyn Unit>) -> Result<(), Box<dyn Unit>> {
        let kind = child.kind();
        let has_lifecycle = self.as_evaluable().is_some();
        let recognized = self.accepts(kind);
        let node = self.node_mut();
        match kind {
            UnitKind::On if has_lifecycle && node.guard.is_none() => {
                node.guard = Some(Arc::from(child));
            }
            UnitKind::Init if has_lifecycle && node.init.is_none() => {
                node.init = Some(Arc::from(child));
            }
            UnitKind::Final if has_lifecycle && node.finalizer.is_none() => {
                node.finalizer = Some(Arc::from(child));
            }
            UnitKind::Using if has_lifecycle => node.using.push(Arc::from(child)),
            UnitKind::Extends if has_lifecycle => node.extends.push(Arc::from(child)),
            _ if recognized => node.children.push(Arc::from(child)),
            _ => return Err(child),
        }
        Ok(())
    }

    /// The raw identifier: `id`, else the per-kind fallback attribute.
    fn id_or_else(&self) -> Option<&str> {
        let node = self.node();
        node.attribute(ID)
            .or_else(|| self.fallback_id_key().and_then(|key| node.attribute(key)))
    }

    /// The identifier evaluated against a runtime context, falling back to
    /// the raw text.
    fn computed_id(&self, rt: &RuntimeContext) -> Option<String> {
        let raw = self.id_or_else()?;
        let (value, _) = expr::evaluate_or_raw(raw, &self.node().eval_context(rt));
        Some(value.to_text())
    }

    /// True when the unit declares an explicit `id`.
    fn has_explicit_id(&self) -> bool {
        self.node().attributes.contains(ID)
    }
}

/// A unit gated by an optional `on` condition.
pub trait Satisfiable: Unit {
    fn satisfies(&self, rt: &RuntimeContext) -> EngineResult<bool> {
        match self.node().guard.as_ref().and_then(|g| g.as_conditional()) {
            Some(guard) => guard.matches(rt),
            None => Ok(true),
        }
    }
}

/// A unit that produces a value through the shared lifecycle.
///
/// Kinds customize the hooks below; the order they run in is fixed by
/// [`crate::lifecycle::evaluate`].
pub trait Evaluable: Satisfiable {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value>;

    /// Result when the guard fails.
    fn no_value(&self) -> Value {
        Value::Null
    }

    /// Whether a null result is still emitted to the parent.
    fn emits_null(&self) -> bool {
        self.node().attributes.flag("emit-null", false)
    }

    /// Bind `using` variables, then run `init`.
    fn before(&self, rt: &mut RuntimeContext) -> EngineResult<()> {
        lifecycle::prologue(self.node(), rt)
    }

    /// Run `final`.
    fn after(&self, _value: &Value, rt: &mut RuntimeContext) -> EngineResult<()> {
        lifecycle::epilogue(self.node(), rt)
    }

    /// Template text evaluated against the computed value, for units whose
    /// own content is the expression.
    fn own_template(&self, _value: &Value) -> Option<String> {
        None
    }
}

pub trait Conditional: Unit {
    fn matches(&self, rt: &RuntimeContext) -> EngineResult<bool>;
}

/// A unit evaluated for its side effect.
pub trait Executable: Evaluable {
    fn execute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        match self.as_evaluable() {
            Some(unit) => lifecycle::evaluate(unit, rt),
            None => Ok(Value::Null),
        }
    }
}

pub trait Emptiable: Unit {
    fn is_empty(&self) -> bool;
}

/// Boilerplate shared by every `Unit` impl whose struct has a `node` field.
macro_rules! unit_node_impl {
    () => {
        fn node(&self) -> &$crate::unit::UnitNode {
            &self.node
        }

        fn node_mut(&mut self) -> &mut $crate::unit::UnitNode {
            &mut self.node
        }

        fn duplicate(&self) -> Box<dyn $crate::unit::Unit> {
            Box::new(self.clone())
        }
    };
}
pub(crate) use unit_node_impl;

/// A comparable snapshot of a unit tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub tag: String,
    pub kind: UnitKind,
    pub attributes: Vec<(String, String)>,
    pub guard: Option<Box<Shape>>,
    pub init: Option<Box<Shape>>,
    pub finalizer: Option<Box<Shape>>,
    pub using: Vec<Shape>,
    pub extends: Vec<Shape>,
    pub children: Vec<Shape>,
}

impl Shape {
    pub fn of(unit: &dyn Unit) -> Shape {
        let node = unit.node();
        let boxed = |slot: &Option<Arc<dyn Unit>>| -> Option<Box<Shape>> {
            slot.as_ref().map(|u| Box::new(Shape::of(u.as_ref())))
        };
        let all = |units: &[Arc<dyn Unit>]| -> Vec<Shape> {
            units.iter().map(|u| Shape::of(u.as_ref())).collect()
        };
        Shape {
            tag: node.tag.clone(),
            kind: unit.kind(),
            attributes: node
                .attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            guard: boxed(&node.guard),
            init: boxed(&node.init),
            finalizer: boxed(&node.finalizer),
            using: all(&node.using[..]),
            extends: all(&node.extends[..]),
            children: all(&node.children[..]),
        }
    }

    /// Indented one-line-per-unit rendering.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(&mut out, 0, "");
        out
    }

    fn write_outline(&self, out: &mut String, depth: usize, role: &str) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(role);
        out.push_str(self.kind.name());
        let authored: Vec<String> = self
            .attributes
            .iter()
            .filter(|(k, _)| !crate::attributes::is_implicit(k))
            .map(|(k, v)| format!("{}={:?}", k, v))
            .collect();
        if !authored.is_empty() {
            out.push(' ');
            out.push_str(&authored.join(" "));
        }
        out.push('\n');

        let slots = [
            (self.guard.as_deref(), "on: "),
            (self.init.as_deref(), "init: "),
            (self.finalizer.as_deref(), "final: "),
        ];
        for (slot, label) in slots {
            if let Some(shape) = slot {
                shape.write_outline(out, depth + 1, label);
            }
        }
        for shape in &self.using {
            shape.write_outline(out, depth + 1, "using: ");
        }
        for shape in &self.extends {
            shape.write_outline(out, depth + 1, "extends: ");
        }
        for shape in &self.children {
            shape.write_outline(out, depth + 1, "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::container::Block;
    use crate::unit::text::Text;

    fn block(id: &str) -> Block {
        Block::new(UnitNode::new(
            "block",
            [("id", id)].into_iter().collect(),
        ))
    }

    #[test]
    fn test_accept_places_children() {
        let mut parent = block("outer");
        assert!(parent.accept(Box::new(block("inner"))).is_ok());
        assert!(parent.accept(Box::new(Text::new("hi"))).is_ok());
        assert_eq!(parent.node().children.len(), 2);
        assert!(parent.node().child("inner").is_some());
        assert_eq!(parent.node().children_of_kind(UnitKind::Text).count(), 1);
    }

    #[test]
    fn test_duplicate_is_shallow_with_fresh_cache() {
        let mut parent = block("outer");
        parent.accept(Box::new(block("inner"))).unwrap();
        parent.node().cache().store(None);

        let copy = parent.duplicate();
        assert!(parent.node().cache().is_processed());
        assert!(!copy.node().cache().is_processed());
        assert!(Arc::ptr_eq(
            &parent.node().attributes,
            &copy.node().attributes
        ));
        assert!(Arc::ptr_eq(
            &parent.node().children[0],
            &copy.node().children[0]
        ));
    }

    #[test]
    fn test_id_or_else_uses_fallback() {
        let set = crate::unit::data::Set::new(UnitNode::new(
            "set",
            [("key", "total")].into_iter().collect(),
        ));
        assert_eq!(set.id_or_else(), Some("total"));
        assert!(!set.has_explicit_id());
    }

    #[test]
    fn test_shape_outline() {
        let mut parent = block("outer");
        parent.accept(Box::new(block("inner"))).unwrap();
        let outline = Shape::of(&parent).outline();
        assert_eq!(outline, "block id=\"outer\"\n  block id=\"inner\"\n");
    }
}
