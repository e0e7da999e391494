/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine configuration, read from TOML.
//!
//! ```toml
//! [engine]
//! auto_create_maps = true
//! max_extension_depth = 16
//!
//! [defaults]
//! mergeable = ["class"]
//!
//! [defaults.kind.loop]
//! joiner = ", "
//!
//! [defaults.tag."ext:card"]
//! class = "card"
//! ```

use crate::error::{EngineError, EngineResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub engine: Settings,
    pub defaults: DefaultsConfig,
}

/// Runtime behavior switches.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Create missing external maps on write instead of failing.
    pub auto_create_maps: bool,

    /// Run `final` blocks when evaluation fails.
    pub finalize_on_error: bool,

    /// Deepest allowed extension chain.
    pub max_extension_depth: usize,

    /// Skip unknown tags with a warning instead of failing compilation.
    pub lenient: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_create_maps: false,
            finalize_on_error: false,
            max_extension_depth: 32,
            lenient: false,
        }
    }
}

/// A table of default attribute values.
pub type AttributeTable = IndexMap<String, Scalar>;

/// Default attribute tables, by lookup key.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Attributes whose authored value is appended to the default.
    pub mergeable: Vec<String>,

    /// Keyed by unit kind name (`loop`, `value-of`, ...).
    pub kind: IndexMap<String, AttributeTable>,

    /// Keyed by local tag name or `prefix:name`.
    pub tag: IndexMap<String, AttributeTable>,

    /// Keyed by namespace URI.
    pub namespace: IndexMap<String, AttributeTable>,

    /// Keyed by the value of a unit's `use-defaults` attribute.
    pub extra: IndexMap<String, AttributeTable>,
}

/// A TOML scalar used as an attribute value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// The attribute text for this scalar.
    pub fn to_attribute(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loading engine configuration");
        Self::from_toml_str(&text)
    }
}
