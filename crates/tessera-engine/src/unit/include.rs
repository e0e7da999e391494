/*
 * include.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The `include` unit.
//!
//! `path="file.xml#id.id"` evaluates the extension-resolved unit at that
//! path. A path without an id trail evaluates every top-level unit of the
//! template and collapses the values they produce.

use super::{Evaluable, Executable, Satisfiable, Unit, UnitKind, UnitNode, unit_node_impl};
use crate::context::RuntimeContext;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle;
use crate::registry::UnitPath;
use crate::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Include {
    node: UnitNode,
}

impl Include {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }

    fn path(&self, rt: &RuntimeContext) -> EngineResult<String> {
        match self.node.eval_attribute("path", rt)? {
            Some(path) if !path.is_null() => Ok(path.to_text()),
            _ => Err(EngineError::InvalidAttribute {
                tag: self.node.tag.clone(),
                attribute: "path".to_string(),
                message: "attribute is required".to_string(),
            }),
        }
    }
}

impl Unit for Include {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Include
    }

    fn fallback_id_key(&self) -> Option<&'static str> {
        Some("path")
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

impl Satisfiable for Include {}

impl Evaluable for Include {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let path = self.path(rt)?;
        let services = Arc::clone(rt.services());
        let origin = self.node.origin.as_deref();
        let target = UnitPath::parse(&path);
        tracing::debug!(path = %path, "Including");

        if target.trail.is_empty() {
            let file = target
                .file_or(origin)
                .ok_or_else(|| EngineError::TemplateNotFound { path: path.clone() })?;
            let template = services.templates.load(file, &services)?;
            let mut values = Vec::new();
            for unit in template.resolve_units(rt)? {
                if let Some(evaluable) = unit.as_evaluable() {
                    let value = lifecycle::evaluate(evaluable, rt)?;
                    if !value.is_null() {
                        values.push(value);
                    }
                }
            }
            return Ok(lifecycle::collapse(values));
        }

        let unit = services.templates.resolve_unit(&path, origin, rt)?;
        match unit.as_evaluable() {
            Some(evaluable) => lifecycle::evaluate(evaluable, rt),
            None => Ok(Value::Null),
        }
    }
}

impl Executable for Include {}

#[cfg(test)]
mod tests {
    use crate::engine::Engine;
    use crate::registry::MemoryLoader;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn engine() -> Engine {
        Engine::builder()
            .with_loader(
                MemoryLoader::new()
                    .with_template(
                        "parts.xml",
                        r#"<template>
                            <block id="greeting">Hello ${who}</block>
                            <block id="bye">Bye</block>
                        </template>"#,
                    )
                    .with_template(
                        "page.xml",
                        r##"<template>
                            <block id="page"><include path="parts.xml#greeting"/>!</block>
                            <block id="local"><include path="#helper"/></block>
                            <block id="helper">help</block>
                            <block id="all"><include path="parts.xml"/></block>
                        </template>"##,
                    ),
            )
            .build()
    }

    #[test]
    fn test_include_by_trail() {
        let engine = engine();
        let mut rt = engine.runtime();
        rt.set_var("who", Value::from("Ada"));
        assert_eq!(
            engine.evaluate("page.xml#page", &mut rt).unwrap(),
            Value::from("Hello Ada!")
        );
    }

    #[test]
    fn test_include_same_template() {
        let engine = engine();
        let mut rt = engine.runtime();
        assert_eq!(
            engine.evaluate("page.xml#local", &mut rt).unwrap(),
            Value::from("help")
        );
    }

    #[test]
    fn test_include_whole_template() {
        let engine = engine();
        let mut rt = engine.runtime();
        rt.set_var("who", Value::from("Bo"));
        assert_eq!(
            engine.evaluate("page.xml#all", &mut rt).unwrap(),
            Value::from("Hello BoBye")
        );
    }

    #[test]
    fn test_include_missing_unit() {
        let engine = Engine::builder()
            .with_loader(MemoryLoader::new().with_template(
                "page.xml",
                r#"<block id="page"><include path="page.xml#nope"/></block>"#,
            ))
            .build();
        let mut rt = engine.runtime();
        assert!(engine.evaluate("page.xml#page", &mut rt).is_err());
    }
}
