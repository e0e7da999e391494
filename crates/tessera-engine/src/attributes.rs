/*
 * attributes.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Unit attribute maps.
//!
//! Attributes are plain strings. The compiler layers them from the
//! defaults resolver, the source node, and a few implicit entries. Whether a
//! value is dynamic is decided later, when a unit asks for a computed
//! attribute (see [`crate::unit::UnitNode::computed_attribute`]).

use indexmap::IndexMap;

/// Implicit attribute: the local tag name of the source node.
pub const NODE_NAME: &str = "_name";
/// Implicit attribute: the unit kind.
pub const NODE_TYPE: &str = "_type";
/// Implicit attribute: the namespace prefix of the source node.
pub const NS_PREFIX: &str = "_prefix";
/// Implicit attribute: the namespace URI of the source node.
pub const NS_URI: &str = "_ns";

/// The identity attribute.
pub const ID: &str = "id";

/// An insertion-ordered attribute map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(IndexMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set an attribute, overwriting any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Set an attribute, concatenating onto an existing value.
    ///
    /// Used for attributes declared mergeable by the defaults resolver. The
    /// old and new values are joined with a single space.
    pub fn merge(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.get_mut(&key) {
            Some(existing) if !existing.is_empty() => {
                existing.push(' ');
                existing.push_str(&value);
            }
            _ => {
                self.0.insert(key, value);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Attributes authored by the user, skipping the implicit `_` entries.
    pub fn authored(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(k, _)| !is_implicit(k))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a boolean-ish attribute (`true`/`yes`/`1`), falling back to
    /// `default` when absent.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(v.trim(), "true" | "yes" | "1"),
            None => default,
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Attributes(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// True for the compiler-set attributes (`_name`, `_type`, ...).
pub fn is_implicit(key: &str) -> bool {
    key.starts_with('_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_concatenates() {
        let mut attrs = Attributes::new();
        attrs.insert("class", "base");
        attrs.merge("class", "extra");
        assert_eq!(attrs.get("class"), Some("base extra"));

        attrs.merge("fresh", "value");
        assert_eq!(attrs.get("fresh"), Some("value"));
    }

    #[test]
    fn test_insert_overwrites() {
        let mut attrs = Attributes::new();
        attrs.insert("joiner", ",");
        attrs.insert("joiner", ";");
        assert_eq!(attrs.get("joiner"), Some(";"));
    }

    #[test]
    fn test_authored_skips_implicit() {
        let attrs: Attributes = [("id", "x"), (NODE_NAME, "set"), ("key", "k")]
            .into_iter()
            .collect();
        let authored: Vec<&str> = attrs.authored().map(|(k, _)| k).collect();
        assert_eq!(authored, vec!["id", "key"]);
    }

    #[test]
    fn test_flag() {
        let attrs: Attributes = [("join", "false"), ("create", "yes")].into_iter().collect();
        assert!(!attrs.flag("join", true));
        assert!(attrs.flag("create", false));
        assert!(attrs.flag("missing", true));
    }
}
