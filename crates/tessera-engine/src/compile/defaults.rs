/*
 * defaults.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Default attribute lookup.

use crate::attributes::Attributes;
use crate::config::{AttributeTable, DefaultsConfig};
use crate::unit::UnitKind;
use std::collections::HashSet;
use std::fmt;

/// What the compiler knows about a node when it asks for defaults.
#[derive(Debug, Clone, Copy)]
pub struct DefaultsQuery<'a> {
    /// Local tag name.
    pub name: &'a str,
    pub kind: UnitKind,
    pub prefix: Option<&'a str>,
    /// Namespace URI.
    pub namespace: Option<&'a str>,
    /// The node's `use-defaults` attribute.
    pub extra: Option<&'a str>,
}

/// Default attribute values for one node, plus the attribute names whose
/// authored values are appended instead of overwriting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Defaults {
    pub values: Attributes,
    pub mergeable: HashSet<String>,
}

/// Source of default attributes for the compiler.
pub trait DefaultsResolver: fmt::Debug + Send + Sync {
    fn defaults(&self, query: &DefaultsQuery<'_>) -> Defaults;
}

/// Resolver backed by the `[defaults]` section of the configuration.
///
/// Tables are layered from lowest to highest priority: kind, tag,
/// `prefix:name`, namespace URI, extra key.
#[derive(Debug, Clone, Default)]
pub struct ConfigDefaults {
    config: DefaultsConfig,
}

impl ConfigDefaults {
    pub fn new(config: DefaultsConfig) -> Self {
        Self { config }
    }
}

fn layer(values: &mut Attributes, table: Option<&AttributeTable>) {
    for (key, value) in table.into_iter().flatten() {
        values.insert(key.as_str(), value.to_attribute());
    }
}

impl DefaultsResolver for ConfigDefaults {
    fn defaults(&self, query: &DefaultsQuery<'_>) -> Defaults {
        let config = &self.config;
        let mut values = Attributes::new();

        layer(&mut values, config.kind.get(query.kind.name()));
        layer(&mut values, config.tag.get(query.name));
        if let Some(prefix) = query.prefix {
            layer(&mut values, config.tag.get(&format!("{}:{}", prefix, query.name)));
        }
        if let Some(namespace) = query.namespace {
            layer(&mut values, config.namespace.get(namespace));
        }
        if let Some(extra) = query.extra {
            layer(&mut values, config.extra.get(extra));
        }

        Defaults {
            values,
            mergeable: config.mergeable.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_layers_in_priority_order() {
        let config = EngineConfig::from_toml_str(
            r#"
            [defaults]
            mergeable = ["class"]
            [defaults.kind.block]
            class = "kind"
            trim = false
            [defaults.tag.card]
            class = "tag"
            [defaults.tag."ext:card"]
            class = "qualified"
            [defaults.namespace."urn:ext"]
            role = "ext"
            [defaults.extra.compact]
            class = "extra"
            "#,
        )
        .unwrap();
        let resolver = ConfigDefaults::new(config.defaults);

        let mut query = DefaultsQuery {
            name: "card",
            kind: UnitKind::Block,
            prefix: None,
            namespace: None,
            extra: None,
        };
        let defaults = resolver.defaults(&query);
        assert_eq!(defaults.values.get("class"), Some("tag"));
        assert_eq!(defaults.values.get("trim"), Some("false"));
        assert!(defaults.mergeable.contains("class"));

        query.prefix = Some("ext");
        query.namespace = Some("urn:ext");
        let defaults = resolver.defaults(&query);
        assert_eq!(defaults.values.get("class"), Some("qualified"));
        assert_eq!(defaults.values.get("role"), Some("ext"));

        query.extra = Some("compact");
        assert_eq!(resolver.defaults(&query).values.get("class"), Some("extra"));
    }
}
