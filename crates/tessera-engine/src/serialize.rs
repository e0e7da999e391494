/*
 * serialize.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named serializers for container values.

use crate::context::RuntimeContext;
use crate::error::{EngineError, EngineResult};
use crate::unit::Unit;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Turns the value a container computed into its serialized form.
pub trait Serializer: fmt::Debug + Send + Sync {
    fn serialize(&self, rt: &RuntimeContext, unit: &dyn Unit, value: &Value) -> EngineResult<Value>;
}

/// JSON text, compact or pretty-printed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, _rt: &RuntimeContext, _unit: &dyn Unit, value: &Value) -> EngineResult<Value> {
        let json = value.to_json();
        let text = if self.pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        };
        text.map(Value::String).map_err(|e| EngineError::Serializer {
            name: if self.pretty { "json-pretty" } else { "json" }.to_string(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SerializerRegistry {
    serializers: HashMap<String, Arc<dyn Serializer>>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerRegistry {
    /// A registry holding `json` and `json-pretty`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("json", JsonSerializer::compact());
        registry.register("json-pretty", JsonSerializer::pretty());
        registry
    }

    pub fn empty() -> Self {
        Self {
            serializers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, serializer: impl Serializer + 'static) {
        self.serializers
            .insert(name.to_string(), Arc::new(serializer));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Serializer>> {
        self.serializers.get(name)
    }

    pub fn serialize(
        &self,
        name: &str,
        rt: &RuntimeContext,
        unit: &dyn Unit,
        value: &Value,
    ) -> EngineResult<Value> {
        let serializer = self
            .get(name)
            .ok_or_else(|| EngineError::UnknownSerializer {
                name: name.to_string(),
            })?;
        tracing::trace!(serializer = name, unit = %unit.kind(), "Serializing");
        serializer.serialize(rt, unit, value)
    }
}
