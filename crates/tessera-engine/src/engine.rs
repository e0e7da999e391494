/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The engine facade.
//!
//! An [`Engine`] owns the shared [`Services`]: unit factories, functions,
//! serializers, attribute defaults, templates and settings. Services are
//! fixed once [`EngineBuilder::build`] returns; every evaluation gets its
//! own [`RuntimeContext`] from [`Engine::runtime`].
//!
//! ```ignore
//! let engine = Engine::builder()
//!     .with_loader(FileSystemLoader::new("templates"))
//!     .register_function("str", "shout", |args, _| {
//!         Ok(Value::from(args[0].to_text().to_uppercase()))
//!     })
//!     .build();
//! let mut rt = engine.runtime();
//! let value = engine.evaluate("page.xml#body", &mut rt)?;
//! ```

use crate::compile::{Compiler, ConfigDefaults, DefaultsResolver, UnitRegistry};
use crate::config::{EngineConfig, Settings};
use crate::context::{ExternalContext, RuntimeContext};
use crate::error::{EngineError, EngineResult};
use crate::expr::{EvalContext, FunctionRegistry};
use crate::extend;
use crate::lifecycle;
use crate::registry::{FileSystemLoader, Template, TemplateLoader, TemplateRegistry, UnitPath};
use crate::serialize::{Serializer, SerializerRegistry};
use crate::unit::{Unit, UnitNode};
use crate::value::Value;
use std::sync::Arc;

/// Everything units and expressions can reach at runtime.
#[derive(Debug)]
pub struct Services {
    pub settings: Settings,
    pub functions: FunctionRegistry,
    pub serializers: SerializerRegistry,
    pub units: UnitRegistry,
    pub defaults: Box<dyn DefaultsResolver>,
    pub templates: TemplateRegistry,
}

/// Builder for [`Engine`].
#[derive(Debug)]
pub struct EngineBuilder {
    settings: Settings,
    functions: FunctionRegistry,
    serializers: SerializerRegistry,
    units: UnitRegistry,
    defaults: Box<dyn DefaultsResolver>,
    loader: Box<dyn TemplateLoader>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            functions: FunctionRegistry::new(),
            serializers: SerializerRegistry::new(),
            units: UnitRegistry::new(),
            defaults: Box::new(ConfigDefaults::default()),
            loader: Box::new(FileSystemLoader::new(".")),
        }
    }
}

impl EngineBuilder {
    /// Apply settings and attribute defaults from a configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.settings = config.engine;
        self.defaults = Box::new(ConfigDefaults::new(config.defaults));
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_defaults(mut self, defaults: impl DefaultsResolver + 'static) -> Self {
        self.defaults = Box::new(defaults);
        self
    }

    /// Register a unit factory for `tag`. Replaces a built-in of the same
    /// name.
    pub fn register_unit<U, F>(mut self, tag: &str, factory: F) -> Self
    where
        U: Unit + 'static,
        F: Fn(UnitNode) -> U + Send + Sync + 'static,
    {
        self.units.register(tag, factory);
        self
    }

    pub fn register_function<F>(mut self, namespace: &str, name: &str, function: F) -> Self
    where
        F: Fn(&[Value], &EvalContext<'_>) -> EngineResult<Value> + Send + Sync + 'static,
    {
        self.functions.register(namespace, name, function);
        self
    }

    pub fn register_namespace(mut self, name: &str, parents: &[&str]) -> Self {
        self.functions.register_namespace(name, parents);
        self
    }

    pub fn register_serializer(mut self, name: &str, serializer: impl Serializer + 'static) -> Self {
        self.serializers.register(name, serializer);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            services: Arc::new(Services {
                settings: self.settings,
                functions: self.functions,
                serializers: self.serializers,
                units: self.units,
                defaults: self.defaults,
                templates: TemplateRegistry::with_boxed_loader(self.loader),
            }),
        }
    }
}

/// Compiles, resolves and evaluates templates.
#[derive(Debug, Clone)]
pub struct Engine {
    services: Arc<Services>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// A fresh runtime context with no external maps.
    pub fn runtime(&self) -> RuntimeContext {
        RuntimeContext::new(Arc::clone(&self.services))
    }

    pub fn runtime_with(&self, external: ExternalContext) -> RuntimeContext {
        RuntimeContext::with_external(Arc::clone(&self.services), external)
    }

    /// The compiled template at `path`, loading it on first use.
    pub fn load(&self, path: &str) -> EngineResult<Arc<Template>> {
        self.services.templates.load(path, &self.services)
    }

    /// Compile `source` and register it under `path`, replacing any
    /// template already loaded there.
    pub fn load_str(&self, path: &str, source: &str) -> EngineResult<Arc<Template>> {
        let units = self.compile_str(source, Some(path))?;
        Ok(self.services.templates.insert(Template::new(path, units)))
    }

    /// Compile `source` without registering it.
    pub fn compile_str(&self, source: &str, origin: Option<&str>) -> EngineResult<Vec<Arc<dyn Unit>>> {
        let compiler = Compiler::new(&self.services);
        match origin {
            Some(origin) => compiler.with_origin(origin).compile_str(source),
            None => compiler.compile_str(source),
        }
    }

    /// Evaluate `file.xml#id.trail`, or every top-level unit of `file.xml`
    /// when no trail is given.
    pub fn evaluate(&self, target: &str, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let path = UnitPath::parse(target);
        let Some(file) = path.file.as_deref() else {
            return Err(EngineError::TemplateNotFound {
                path: target.to_string(),
            });
        };
        if path.trail.is_empty() {
            let values = self.run_template(file, rt)?;
            return Ok(lifecycle::collapse(
                values.into_iter().filter(|v| !v.is_null()).collect(),
            ));
        }
        let unit = self.services.templates.resolve_unit(target, None, rt)?;
        match unit.as_evaluable() {
            Some(evaluable) => lifecycle::evaluate(evaluable, rt),
            None => {
                tracing::debug!(unit = %unit.kind(), "Target is not evaluable");
                Ok(Value::Null)
            }
        }
    }

    /// Resolve extensions on `unit` and evaluate the result.
    pub fn evaluate_unit(&self, unit: &Arc<dyn Unit>, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let resolved = extend::resolve(unit, rt)?;
        match resolved.unit.as_evaluable() {
            Some(evaluable) => lifecycle::evaluate(evaluable, rt),
            None => {
                tracing::debug!(unit = %resolved.unit.kind(), "Target is not evaluable");
                Ok(Value::Null)
            }
        }
    }

    /// Evaluate every top-level unit of a template in order, returning each
    /// value.
    pub fn run_template(&self, path: &str, rt: &mut RuntimeContext) -> EngineResult<Vec<Value>> {
        let template = self.load(path)?;
        let mut values = Vec::new();
        for unit in template.resolve_units(rt)? {
            if let Some(evaluable) = unit.as_evaluable() {
                values.push(lifecycle::evaluate(evaluable, rt)?);
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryLoader;
    use crate::unit::UnitKind;
    use crate::unit::container::Block;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_evaluate_targets() {
        let engine = Engine::builder()
            .with_loader(MemoryLoader::new().with_template(
                "page.xml",
                r#"<template>
                    <block id="a">A</block>
                    <block id="b"><block id="c">C</block></block>
                </template>"#,
            ))
            .build();
        let mut rt = engine.runtime();
        assert_eq!(engine.evaluate("page.xml#b.c", &mut rt).unwrap(), Value::from("C"));
        assert_eq!(engine.evaluate("page.xml", &mut rt).unwrap(), Value::from("AC"));
        assert!(matches!(
            engine.evaluate("#a", &mut rt),
            Err(EngineError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_mixed_content_keeps_inline_spaces() {
        let engine = Engine::builder()
            .with_loader(MemoryLoader::new().with_template(
                "mixed.xml",
                r#"<template>
                    <block id="inline">Hello <value value="Ada"/> and welcome</block>
                    <block id="indented">
                        Dear <value value="Bo"/>,
                    </block>
                    <block id="exact" trim="true"> x <value value="y"/> </block>
                </template>"#,
            ))
            .build();
        let mut rt = engine.runtime();
        assert_eq!(
            engine.evaluate("mixed.xml#inline", &mut rt).unwrap(),
            Value::from("Hello Ada and welcome")
        );
        assert_eq!(
            engine.evaluate("mixed.xml#indented", &mut rt).unwrap(),
            Value::from("Dear Bo,")
        );
        assert_eq!(engine.evaluate("mixed.xml#exact", &mut rt).unwrap(), Value::from("xy"));
    }

    #[test]
    fn test_load_str_replaces_template() {
        let engine = Engine::builder().with_loader(MemoryLoader::new()).build();
        engine.load_str("t.xml", r#"<block id="x">one</block>"#).unwrap();
        engine.load_str("t.xml", r#"<block id="x">two</block>"#).unwrap();
        let mut rt = engine.runtime();
        assert_eq!(engine.evaluate("t.xml#x", &mut rt).unwrap(), Value::from("two"));
    }

    #[test]
    fn test_register_function_and_unit() {
        let engine = Engine::builder()
            .with_loader(MemoryLoader::new().with_template(
                "p.xml",
                r#"<panel id="p">${str:shout('hi')}</panel>"#,
            ))
            .register_function("str", "shout", |args, _| {
                Ok(Value::from(args[0].to_text().to_uppercase()))
            })
            .register_unit("panel", Block::new)
            .build();
        assert!(engine.services().units.contains("panel"));
        let template = engine.load("p.xml").unwrap();
        assert_eq!(template.units()[0].kind(), UnitKind::Block);

        let mut rt = engine.runtime();
        assert_eq!(engine.evaluate("p.xml#p", &mut rt).unwrap(), Value::from("HI"));
    }
}
