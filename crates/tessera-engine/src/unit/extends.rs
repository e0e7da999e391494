/*
 * extends.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The `extends` link.
//!
//! A link names a base unit by `path`, says how to combine it (`strategy`)
//! and whether attributes are inherited as well as children (`scope`). An
//! `on` child makes the base conditional. The link evaluates to its path.

use super::{Evaluable, Satisfiable, Unit, UnitKind, UnitNode, unit_node_impl};
use crate::context::RuntimeContext;
use crate::error::{EngineError, EngineResult};
use crate::value::Value;
use std::str::FromStr;

/// How a base is combined into the extending unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    Merge,
    Replace,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "merge" => Ok(Strategy::Merge),
            "replace" => Ok(Strategy::Replace),
            other => Err(format!("expected 'merge' or 'replace', got '{}'", other)),
        }
    }
}

/// What a merge inherits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtendScope {
    /// Children and lifecycle blocks only.
    #[default]
    Children,
    /// Also base attributes the unit does not set itself.
    Full,
}

impl FromStr for ExtendScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "children" => Ok(ExtendScope::Children),
            "full" => Ok(ExtendScope::Full),
            other => Err(format!("expected 'children' or 'full', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtendsLink {
    node: UnitNode,
}

impl ExtendsLink {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }

    pub fn link(&self) -> Link<'_> {
        Link::new(&self.node)
    }
}

/// Read access to the settings of a link node.
#[derive(Debug, Clone, Copy)]
pub struct Link<'a> {
    node: &'a UnitNode,
}

impl<'a> Link<'a> {
    pub fn new(node: &'a UnitNode) -> Self {
        Self { node }
    }

    /// The raw path text.
    pub fn raw_path(&self) -> Option<&'a str> {
        self.node.attribute("path")
    }

    /// True when the path, strategy or scope depends on the runtime
    /// context.
    pub fn is_dynamic(&self) -> bool {
        ["path", "strategy", "scope"]
            .iter()
            .any(|key| self.node.is_dynamic_attribute(key))
    }

    pub fn is_guarded(&self) -> bool {
        self.node.guard.is_some()
    }

    /// Whether the `on` guard, if any, holds.
    pub fn applies(&self, rt: &RuntimeContext) -> EngineResult<bool> {
        match self.node.guard.as_ref().and_then(|g| g.as_conditional()) {
            Some(guard) => guard.matches(rt),
            None => Ok(true),
        }
    }

    /// The path evaluated against `rt`. Errors propagate.
    pub fn path(&self, rt: &RuntimeContext) -> EngineResult<String> {
        match self.node.eval_attribute("path", rt)? {
            Some(path) if !path.is_null() => Ok(path.to_text()),
            _ => Err(self.invalid("path", "attribute is required".to_string())),
        }
    }

    pub fn strategy(&self, rt: &RuntimeContext) -> EngineResult<Strategy> {
        self.parsed("strategy", rt)
    }

    pub fn scope(&self, rt: &RuntimeContext) -> EngineResult<ExtendScope> {
        self.parsed("scope", rt)
    }

    fn parsed<T>(&self, key: &str, rt: &RuntimeContext) -> EngineResult<T>
    where
        T: FromStr<Err = String> + Default,
    {
        match self.node.computed_attribute(key, rt) {
            Some(text) => text.parse().map_err(|message| self.invalid(key, message)),
            None => Ok(T::default()),
        }
    }

    fn invalid(&self, attribute: &str, message: String) -> EngineError {
        EngineError::InvalidAttribute {
            tag: self.node.tag.clone(),
            attribute: attribute.to_string(),
            message,
        }
    }
}

impl Unit for ExtendsLink {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Extends
    }

    fn fallback_id_key(&self) -> Option<&'static str> {
        Some("path")
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }
}

impl Satisfiable for ExtendsLink {}

impl Evaluable for ExtendsLink {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        self.link().path(rt).map(Value::String)
    }
}
