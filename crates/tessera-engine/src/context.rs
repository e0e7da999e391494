/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Runtime context: the per-evaluation state carrier.
//!
//! A [`RuntimeContext`] holds exactly two layers:
//!
//! 1. **External context**: named mutable maps owned by the caller. `set`
//!    and `unset` units write here, `value-of` and `map` units read here.
//!    The maps survive across evaluations.
//! 2. **Internal context**: the engine-owned [`Scope`] of variables (loop
//!    state, `using` bindings, published sibling values). It is `None` until
//!    the first binding, and the lifecycle saves and restores it around
//!    every evaluation so nested mutations never leak to siblings.
//!
//! Each thread evaluating a shared unit tree must use its own context.

use crate::engine::Services;
use crate::error::{EngineError, EngineResult};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Variable bindings of the internal context.
pub type Scope = IndexMap<String, Value>;

/// One named map of the external context.
pub type ExternalMap = IndexMap<String, Value>;

/// Caller-owned named maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalContext {
    maps: IndexMap<String, ExternalMap>,
}

impl ExternalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a named map.
    pub fn insert_map(&mut self, name: impl Into<String>, map: ExternalMap) {
        self.maps.insert(name.into(), map);
    }

    /// Builder-style variant of [`insert_map`](Self::insert_map).
    pub fn with_map(mut self, name: impl Into<String>, map: ExternalMap) -> Self {
        self.insert_map(name, map);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ExternalMap> {
        self.maps.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ExternalMap> {
        self.maps.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    /// Load maps from a JSON object of objects.
    ///
    /// Every top-level key becomes a map name. Non-object members are
    /// rejected.
    pub fn from_json(json: &serde_json::Value) -> EngineResult<Self> {
        let serde_json::Value::Object(top) = json else {
            return Err(EngineError::Config(
                "external context must be a JSON object".to_string(),
            ));
        };
        let mut ctx = ExternalContext::new();
        for (name, member) in top {
            match Value::from_json(member) {
                Value::Map(map) => ctx.insert_map(name.clone(), map),
                other => {
                    return Err(EngineError::Config(format!(
                        "external context '{}' must be an object, found {}",
                        name,
                        other.type_name()
                    )));
                }
            }
        }
        Ok(ctx)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.maps
                .iter()
                .map(|(name, map)| (name.clone(), Value::Map(map.clone()).to_json()))
                .collect(),
        )
    }
}

/// Per-evaluation state: external maps, the internal scope, and a handle
/// to the engine services (functions, serializers, templates, settings).
pub struct RuntimeContext {
    services: Arc<Services>,
    external: ExternalContext,
    internal: Option<Scope>,
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("external", &self.external)
            .field("internal", &self.internal)
            .finish_non_exhaustive()
    }
}

impl RuntimeContext {
    /// Create a context with no external maps and a null scope.
    pub fn new(services: Arc<Services>) -> Self {
        Self::with_external(services, ExternalContext::new())
    }

    pub fn with_external(services: Arc<Services>, external: ExternalContext) -> Self {
        Self {
            services,
            external,
            internal: None,
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn external(&self) -> &ExternalContext {
        &self.external
    }

    pub fn external_mut(&mut self) -> &mut ExternalContext {
        &mut self.external
    }

    /// Consume the context, handing the external maps back to the caller.
    pub fn into_external(self) -> ExternalContext {
        self.external
    }

    /// Read a key from a named external map.
    pub fn read(&self, map: &str, key: &str) -> Option<&Value> {
        self.external.get(map).and_then(|m| m.get(key))
    }

    /// Write a key into a named external map.
    ///
    /// A missing map is created when `create` is true or the engine is
    /// configured with `auto_create_maps`; otherwise this is a
    /// [`EngineError::MissingContext`] error.
    pub fn write(&mut self, map: &str, key: &str, value: Value, create: bool) -> EngineResult<()> {
        if !self.external.contains(map) {
            if create || self.services.settings.auto_create_maps {
                tracing::debug!(context = map, "Creating external context");
                self.external.insert_map(map, ExternalMap::new());
            } else {
                return Err(EngineError::MissingContext {
                    name: map.to_string(),
                });
            }
        }
        if let Some(target) = self.external.get_mut(map) {
            target.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Remove a key from a named external map, returning the old value.
    pub fn remove(&mut self, map: &str, key: &str) -> EngineResult<Option<Value>> {
        let target = self
            .external
            .get_mut(map)
            .ok_or_else(|| EngineError::MissingContext {
                name: map.to_string(),
            })?;
        Ok(target.shift_remove(key))
    }

    /// The active internal scope, if any binding has been made yet.
    pub fn scope(&self) -> Option<&Scope> {
        self.internal.as_ref()
    }

    /// Look up a variable in the internal scope.
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.internal.as_ref().and_then(|s| s.get(name))
    }

    /// Bind a variable in the internal scope, creating the scope if needed.
    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.internal
            .get_or_insert_with(Scope::new)
            .insert(name.into(), value);
    }

    pub fn remove_var(&mut self, name: &str) -> Option<Value> {
        self.internal.as_mut().and_then(|s| s.shift_remove(name))
    }

    /// Copy the active scope so it can be reinstated later.
    ///
    /// The active scope keeps being the live map; the returned copy is the
    /// snapshot the lifecycle restores on exit.
    pub(crate) fn save_scope(&self) -> Option<Scope> {
        self.internal.clone()
    }

    /// Reinstate a scope captured by [`save_scope`](Self::save_scope).
    pub(crate) fn restore_scope(&mut self, saved: Option<Scope>) {
        self.internal = saved;
    }
}
