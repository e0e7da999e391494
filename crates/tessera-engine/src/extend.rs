/*
 * extend.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Extension resolution.
//!
//! [`resolve`] applies a unit's `extends` links to a clone of the unit and
//! returns the clone. The canonical unit is never edited; the outcome is
//! only recorded in its [`ExtensionCache`](crate::unit::ExtensionCache),
//! and only when the outcome cannot depend on the runtime context.
//!
//! A result is not cacheable when any link in the chain has a dynamic
//! path, strategy or scope, any link is guarded by `on`, or a merged child
//! has a dynamic identifier.
//!
//! Combining a base into the clone:
//!
//! - `replace`: the clone becomes a copy of the resolved base, keeping its
//!   own `id`.
//! - `merge`: `init`/`final` steps and `using` blocks missing from the clone
//!   are added, the base guard is adopted when the clone has none, and
//!   children are merged by raw id. Same-id containers merge recursively,
//!   other same-id children keep the clone's version, and base-only
//!   children are appended in base order. With `scope="full"` base
//!   attributes the clone does not set are copied as well.

use crate::attributes::{self, ID};
use crate::context::RuntimeContext;
use crate::error::{EngineError, EngineResult};
use crate::expr;
use crate::unit::Unit;
use crate::unit::extends::{ExtendScope, Link, Strategy};
use std::sync::Arc;

/// Outcome of [`resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The resolved unit: the cached clone, a fresh clone, or the unit
    /// itself when nothing changed.
    pub unit: Arc<dyn Unit>,
    /// False when the result depends on the runtime context.
    pub cacheable: bool,
}

/// Resolve the extension links of `unit` and of its descendants.
pub fn resolve(unit: &Arc<dyn Unit>, rt: &RuntimeContext) -> EngineResult<Resolved> {
    resolve_at(unit, rt, 0)
}

fn describe(unit: &dyn Unit) -> String {
    let node = unit.node();
    format!(
        "{}#{}",
        node.origin.as_deref().unwrap_or("<inline>"),
        unit.id_or_else().unwrap_or(&node.tag)
    )
}

fn resolve_at(unit: &Arc<dyn Unit>, rt: &RuntimeContext, depth: usize) -> EngineResult<Resolved> {
    let max_depth = rt.services().settings.max_extension_depth;
    if depth > max_depth {
        return Err(EngineError::RecursiveExtension {
            path: describe(unit.as_ref()),
            max_depth,
        });
    }

    let cache = unit.node().cache();
    if cache.is_processed() {
        let cached = cache.resolved().cloned().unwrap_or_else(|| Arc::clone(unit));
        return Ok(Resolved {
            unit: cached,
            cacheable: true,
        });
    }

    let mut clone = unit.duplicate();
    let links = std::mem::take(&mut clone.node_mut().extends);
    let mut cacheable = true;
    let mut changed = false;

    for link_unit in &links {
        let link = Link::new(link_unit.node());
        if link.is_guarded() {
            cacheable = false;
            if !link.applies(rt)? {
                tracing::debug!(unit = %describe(unit.as_ref()), "Skipping extension with false guard");
                continue;
            }
        }
        if link.is_dynamic() {
            cacheable = false;
        }

        let path = link.path(rt)?;
        let strategy = link.strategy(rt)?;
        let scope = link.scope(rt)?;
        let services = rt.services();
        let base = services.templates.find_unit(
            &path,
            link_unit.node().origin.as_deref().or(clone.node().origin.as_deref()),
            clone.id_or_else(),
            services,
        )?;
        let base = resolve_at(&base, rt, depth + 1)?;
        cacheable &= base.cacheable;

        tracing::debug!(
            unit = %describe(unit.as_ref()),
            base = %path,
            ?strategy,
            ?scope,
            "Applying extension"
        );
        match strategy {
            Strategy::Replace => clone = replace(clone.as_ref(), base.unit.as_ref()),
            Strategy::Merge => cacheable &= merge(clone.as_mut(), base.unit.as_ref(), scope),
        }
        changed = true;
    }

    // Children are resolved against the finished clone and swapped in
    // together.
    let mut children = Vec::with_capacity(clone.node().children.len());
    let mut children_changed = false;
    for child in &clone.node().children {
        let resolved = resolve_at(child, rt, depth)?;
        cacheable &= resolved.cacheable;
        children_changed |= !Arc::ptr_eq(&resolved.unit, child);
        children.push(resolved.unit);
    }
    if children_changed {
        clone.node_mut().children = children;
        changed = true;
    }

    let result: Arc<dyn Unit> = if changed {
        Arc::from(clone)
    } else {
        Arc::clone(unit)
    };
    if cacheable {
        tracing::debug!(unit = %describe(unit.as_ref()), changed, "Caching extension result");
        cache.store(changed.then(|| Arc::clone(&result)));
    } else {
        tracing::debug!(unit = %describe(unit.as_ref()), "Extension result depends on context");
    }
    Ok(Resolved {
        unit: result,
        cacheable,
    })
}

fn replace(current: &dyn Unit, base: &dyn Unit) -> Box<dyn Unit> {
    let mut replaced = base.duplicate();
    let node = replaced.node_mut();
    node.extends.clear();
    if let Some(id) = current.node().attribute(ID) {
        node.attributes_mut().insert(ID, id);
    }
    replaced
}

/// Merge `base` into `target`. Returns false when a dynamic child id made
/// the result context dependent.
fn merge(target: &mut dyn Unit, base: &dyn Unit, scope: ExtendScope) -> bool {
    let mut cacheable = true;
    let base_node = base.node();
    let node = target.node_mut();

    node.init = merge_steps(node.init.take(), base_node.init.as_ref());
    node.finalizer = merge_steps(node.finalizer.take(), base_node.finalizer.as_ref());

    let mut using: Vec<Arc<dyn Unit>> = base_node
        .using
        .iter()
        .filter(|b| match b.id_or_else() {
            Some(id) => !node.using.iter().any(|u| u.id_or_else() == Some(id)),
            None => true,
        })
        .cloned()
        .collect();
    // Own bindings run last so they win.
    using.append(&mut node.using);
    node.using = using;

    if node.guard.is_none() {
        node.guard = base_node.guard.clone();
    }

    for base_child in &base_node.children {
        let Some(id) = base_child.id_or_else() else {
            node.children.push(Arc::clone(base_child));
            continue;
        };
        if expr::is_dynamic(id) {
            tracing::debug!(id, "Not merging child with dynamic id");
            cacheable = false;
            continue;
        }
        let Some(position) = node
            .children
            .iter()
            .position(|c| c.id_or_else() == Some(id))
        else {
            node.children.push(Arc::clone(base_child));
            continue;
        };
        let own = &node.children[position];
        if own.is_container() && base_child.is_container() {
            let mut merged = own.duplicate();
            cacheable &= merge(merged.as_mut(), base_child.as_ref(), scope);
            node.children[position] = Arc::from(merged);
        }
    }

    if scope == ExtendScope::Full {
        let inherited: Vec<(String, String)> = base_node
            .attributes
            .iter()
            .filter(|(k, _)| *k != ID && !attributes::is_implicit(k) && !node.attributes.contains(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if !inherited.is_empty() {
            let attrs = node.attributes_mut();
            for (key, value) in inherited {
                attrs.insert(key, value);
            }
        }
    }

    cacheable
}

fn merge_steps(own: Option<Arc<dyn Unit>>, base: Option<&Arc<dyn Unit>>) -> Option<Arc<dyn Unit>> {
    match (own, base) {
        (own, None) => own,
        (None, Some(base)) => Some(Arc::clone(base)),
        (Some(own), Some(base)) => {
            let mut merged = own.duplicate();
            for step in &base.node().children {
                let present = step
                    .id_or_else()
                    .is_some_and(|id| own.node().child(id).is_some());
                if !present {
                    merged.node_mut().children.push(Arc::clone(step));
                }
            }
            Some(Arc::from(merged))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::registry::MemoryLoader;
    use crate::unit::{Shape, UnitKind};
    use pretty_assertions::assert_eq;

    const BASE: &str = r#"<template>
        <block id="card" role="card">
            <on test="true"/>
            <init><set id="opened" context="log" key="opened" value="yes"/></init>
            <block id="title">Base title</block>
            <block id="body"><text id="intro">Intro</text><text id="more">More</text></block>
            <text id="footer">Base footer</text>
        </block>
    </template>"#;

    fn engine() -> Engine {
        Engine::builder()
            .with_loader(MemoryLoader::new().with_template("base.xml", BASE))
            .build()
    }

    fn compile_one(engine: &Engine, source: &str) -> Arc<dyn Unit> {
        engine.compile_str(source, Some("page.xml")).unwrap().remove(0)
    }

    fn child_ids(unit: &dyn Unit) -> Vec<String> {
        unit.node()
            .children
            .iter()
            .filter_map(|c| c.id_or_else().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_merge_children_and_blocks() {
        let engine = engine();
        let rt = engine.runtime();
        let unit = compile_one(
            &engine,
            r#"<block id="card">
                <extends path="base.xml#card"/>
                <block id="body"><text id="more">Mine</text><text id="extra">Extra</text></block>
                <text id="footer">My footer</text>
            </block>"#,
        );

        let resolved = resolve(&unit, &rt).unwrap();
        assert!(resolved.cacheable);
        let merged = resolved.unit;
        assert_eq!(child_ids(merged.as_ref()), vec!["body", "footer", "title"]);
        assert!(merged.node().guard.is_some());
        assert!(merged.node().init.is_some());
        assert!(merged.node().extends.is_empty());
        // Children-only scope does not inherit attributes.
        assert_eq!(merged.node().attribute("role"), None);

        let body = merged.node().child("body").unwrap();
        assert_eq!(child_ids(body.as_ref()), vec!["more", "extra", "intro"]);
        let footer = merged.node().child("footer").unwrap();
        assert_eq!(footer.node().origin.as_deref(), Some("page.xml"));
        let title = merged.node().child("title").unwrap();
        assert_eq!(title.node().origin.as_deref(), Some("base.xml"));

        // The canonical unit is untouched.
        assert_eq!(unit.node().extends.len(), 1);
        assert_eq!(child_ids(unit.as_ref()), vec!["body", "footer"]);
    }

    #[test]
    fn test_full_scope_copies_missing_attributes() {
        let engine = engine();
        let rt = engine.runtime();
        let unit = compile_one(
            &engine,
            r#"<block id="mine" role="own"><extends path="base.xml#card" scope="full"/></block>"#,
        );
        let merged = resolve(&unit, &rt).unwrap().unit;
        assert_eq!(merged.node().attribute("id"), Some("mine"));
        assert_eq!(merged.node().attribute("role"), Some("own"));

        let unit = compile_one(
            &engine,
            r#"<block id="mine"><extends path="base.xml#card" scope="full"/></block>"#,
        );
        let merged = resolve(&unit, &rt).unwrap().unit;
        assert_eq!(merged.node().attribute("role"), Some("card"));
    }

    #[test]
    fn test_replace_keeps_own_id() {
        let engine = engine();
        let rt = engine.runtime();
        let unit = compile_one(
            &engine,
            r#"<value id="slot"><extends path="base.xml#card" strategy="replace"/></value>"#,
        );
        let replaced = resolve(&unit, &rt).unwrap().unit;
        assert_eq!(replaced.kind(), UnitKind::Block);
        assert_eq!(replaced.id_or_else(), Some("slot"));
        assert_eq!(child_ids(replaced.as_ref()), vec!["title", "body", "footer"]);
    }

    #[test]
    fn test_cache_hit_returns_same_clone() {
        let engine = engine();
        let rt = engine.runtime();
        let unit = compile_one(
            &engine,
            r#"<block id="card"><extends path="base.xml#card"/></block>"#,
        );
        let first = resolve(&unit, &rt).unwrap();
        assert!(unit.node().cache().is_processed());
        let second = resolve(&unit, &rt).unwrap();
        assert!(Arc::ptr_eq(&first.unit, &second.unit));
        assert_eq!(Shape::of(first.unit.as_ref()), Shape::of(second.unit.as_ref()));
    }

    #[test]
    fn test_unit_without_links_resolves_to_itself() {
        let engine = engine();
        let rt = engine.runtime();
        let unit = compile_one(&engine, r#"<block id="plain"><block id="x"/></block>"#);
        let resolved = resolve(&unit, &rt).unwrap();
        assert!(Arc::ptr_eq(&resolved.unit, &unit));
        assert!(unit.node().cache().is_processed());
        assert!(unit.node().cache().resolved().is_none());
    }

    #[test]
    fn test_guarded_link_is_never_cached() {
        let engine = engine();
        let mut rt = engine.runtime();
        let unit = compile_one(
            &engine,
            r#"<block id="card">
                <extends path="base.xml#card"><on test="fancy"/></extends>
            </block>"#,
        );

        let plain = resolve(&unit, &rt).unwrap();
        assert!(!plain.cacheable);
        assert!(plain.unit.node().children.is_empty());

        rt.set_var("fancy", true.into());
        let fancy = resolve(&unit, &rt).unwrap();
        assert_eq!(child_ids(fancy.unit.as_ref()), vec!["title", "body", "footer"]);
        assert!(!unit.node().cache().is_processed());
    }

    #[test]
    fn test_self_extension_hits_depth_limit() {
        let engine = Engine::builder()
            .with_loader(MemoryLoader::new().with_template(
                "loop.xml",
                r#"<block id="me"><extends path="loop.xml#me"/></block>"#,
            ))
            .build();
        let rt = engine.runtime();
        let template = engine.load("loop.xml").unwrap();
        let err = resolve(&template.units()[0], &rt).unwrap_err();
        assert!(matches!(err, EngineError::RecursiveExtension { max_depth: 32, .. }));
    }
}
