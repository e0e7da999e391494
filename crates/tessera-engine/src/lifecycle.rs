/*
 * lifecycle.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The evaluation lifecycle shared by every evaluable unit.
//!
//! [`evaluate`] runs a fixed sequence that unit kinds cannot reorder:
//!
//! 1. `satisfies` (the `on` guard); a false guard returns `no_value()`
//! 2. snapshot the internal scope
//! 3. `before` (bind `using`, run `init`)
//! 4. `compute`
//! 5. transforms: group match, message format, expression, default
//! 6. `after` (run `final`)
//! 7. restore the scope, on the error path too
//! 8. publish the value under the unit's id into the restored scope

use crate::context::RuntimeContext;
use crate::error::EngineResult;
use crate::expr::functions::cached_regex;
use crate::expr::{self, Extent};
use crate::unit::{Evaluable, Unit, UnitNode};
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::sync::Arc;

/// Evaluate a unit through the full lifecycle.
pub fn evaluate(unit: &dyn Evaluable, rt: &mut RuntimeContext) -> EngineResult<Value> {
    if !unit.satisfies(rt)? {
        tracing::trace!(unit = %unit.kind(), id = unit.id_or_else().unwrap_or(""), "Guard not satisfied");
        return Ok(unit.no_value());
    }

    let saved = rt.save_scope();
    let result = match run(unit, rt) {
        Ok(value) => Ok(value),
        Err(err) => {
            let finalize = unit
                .node()
                .attributes
                .flag("finalize-on-error", rt.services().settings.finalize_on_error);
            if finalize {
                if let Err(final_err) = unit.after(&Value::Null, rt) {
                    tracing::warn!(error = %final_err, "Finalizer failed after evaluation error");
                }
            }
            Err(err)
        }
    };
    rt.restore_scope(saved);

    let value = result?;
    publish(unit, &value, rt);
    Ok(value)
}

fn run(unit: &dyn Evaluable, rt: &mut RuntimeContext) -> EngineResult<Value> {
    unit.before(rt)?;
    let value = unit.compute(rt)?;
    let value = transform(unit, value, rt)?;
    unit.after(&value, rt)?;
    Ok(value)
}

fn publish(unit: &dyn Evaluable, value: &Value, rt: &mut RuntimeContext) {
    if value.is_null() || !unit.has_explicit_id() {
        return;
    }
    if let Some(id) = unit.computed_id(rt) {
        tracing::trace!(id = %id, "Publishing value");
        rt.set_var(id, value.clone());
    }
}

/// Bind `using` variables, then run the `init` block.
pub fn prologue(node: &UnitNode, rt: &mut RuntimeContext) -> EngineResult<()> {
    for using in &node.using {
        bind_using(using.as_ref(), rt)?;
    }
    if let Some(init) = &node.init {
        run_steps(init.node(), rt)?;
    }
    Ok(())
}

/// Run the `final` block.
pub fn epilogue(node: &UnitNode, rt: &mut RuntimeContext) -> EngineResult<()> {
    if let Some(finalizer) = &node.finalizer {
        run_steps(finalizer.node(), rt)?;
    }
    Ok(())
}

fn bind_using(using: &dyn Unit, rt: &mut RuntimeContext) -> EngineResult<()> {
    let node = using.node();
    for (key, raw) in node.attributes.authored() {
        if key == crate::attributes::ID {
            continue;
        }
        let value = expr::evaluate_template(raw, Extent::Full, &node.eval_context(rt))?;
        rt.set_var(key, value);
    }
    for child in &node.children {
        let Some(evaluable) = child.as_evaluable() else {
            continue;
        };
        let value = evaluate(evaluable, rt)?;
        if value.is_null() {
            continue;
        }
        if let Some(id) = child.computed_id(rt) {
            rt.set_var(id, value);
        }
    }
    Ok(())
}

fn run_steps(block: &UnitNode, rt: &mut RuntimeContext) -> EngineResult<()> {
    for step in &block.children {
        if let Some(evaluable) = step.as_evaluable() {
            evaluate(evaluable, rt)?;
        }
    }
    Ok(())
}

/// Evaluate children in order, keeping the values they emit.
pub(crate) fn emitted(
    children: &[Arc<dyn Unit>],
    rt: &mut RuntimeContext,
) -> EngineResult<Vec<(Arc<dyn Unit>, Value)>> {
    let mut out = Vec::new();
    for child in children {
        let Some(evaluable) = child.as_evaluable() else {
            continue;
        };
        let value = evaluate(evaluable, rt)?;
        if !value.is_null() || evaluable.emits_null() {
            out.push((Arc::clone(child), value));
        }
    }
    Ok(out)
}

/// Concatenated text of the values.
pub(crate) fn concat(values: &[Value]) -> String {
    values.iter().map(Value::to_text).collect()
}

/// A single value stays raw; several become their concatenated text.
pub(crate) fn collapse(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.pop().unwrap_or_default(),
        _ => Value::String(concat(&values)),
    }
}

fn transform(unit: &dyn Evaluable, value: Value, rt: &RuntimeContext) -> EngineResult<Value> {
    let node = unit.node();

    let mut value = group_match(node, value)?;

    if let Some(format) = node.attribute("format") {
        if !value.is_null() {
            value = Value::String(format_message(format, &value));
        }
    }

    let extent = Extent::from_attribute(node.attribute("eval"));
    if extent != Extent::None {
        let next = if let Some(template) = unit.own_template(&value) {
            let ctx = node.eval_context(rt).with_this(&value);
            Some(expr::evaluate_template(&template, extent, &ctx)?)
        } else if let Some(transform) = node.attribute("transform") {
            let ctx = node.eval_context(rt).with_this(&value);
            Some(expr::evaluate_expression(transform, &ctx)?)
        } else {
            None
        };
        if let Some(next) = next {
            value = next;
        }
    }

    if value.is_null() {
        if let Some(default) = node.computed_value("default", rt) {
            value = default;
        }
    }

    Ok(value)
}

/// `split` turns the text into a list; `match` with an optional `group`
/// (index or name) extracts one capture.
fn group_match(node: &UnitNode, value: Value) -> EngineResult<Value> {
    if value.is_null() {
        return Ok(value);
    }
    if let Some(pattern) = node.attribute("split") {
        let re = cached_regex(pattern)?;
        let text = value.to_text();
        return Ok(Value::List(re.split(&text).map(Value::from).collect()));
    }
    if let Some(pattern) = node.attribute("match") {
        let re = cached_regex(pattern)?;
        let text = value.to_text();
        let Some(caps) = re.captures(&text) else {
            return Ok(Value::Null);
        };
        let group = node.attribute("group").unwrap_or("0");
        let found = match group.parse::<usize>() {
            Ok(index) => caps.get(index),
            Err(_) => caps.name(group),
        };
        return Ok(found
            .map(|m| Value::from(m.as_str()))
            .unwrap_or_default());
    }
    Ok(value)
}

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_\-]*)\}").expect("Invalid placeholder pattern"));

/// Substitute `{}`, `{0}` and `{name}` placeholders. Unknown placeholders
/// are kept as written.
fn format_message(format: &str, value: &Value) -> String {
    PLACEHOLDER
        .replace_all(format, |caps: &Captures| {
            let name = &caps[1];
            let found = if name.is_empty() {
                Some(value.to_text())
            } else if let Ok(index) = name.parse::<usize>() {
                match value {
                    Value::List(items) => items.get(index).map(Value::to_text),
                    Value::Seq(seq) => seq.iter().nth(index).map(|v| v.to_text()),
                    Value::Map(_) => None,
                    scalar if index == 0 => Some(scalar.to_text()),
                    _ => None,
                }
            } else {
                match value {
                    Value::Map(map) => map.get(name).map(Value::to_text),
                    _ => None,
                }
            };
            found.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        let list = Value::List(vec![Value::from("a"), Value::Int(2)]);
        assert_eq!(format_message("{1}-{0}", &list), "2-a");
        assert_eq!(format_message("[{}]", &Value::from("x")), "[x]");

        let map = Value::from_json(&serde_json::json!({"name": "Ada"}));
        assert_eq!(format_message("Hi {name} {other}", &map), "Hi Ada {other}");
    }

    #[test]
    fn test_group_match() {
        let node = UnitNode::new(
            "value",
            [("match", r"(?P<year>\d{4})-(\d{2})"), ("group", "year")]
                .into_iter()
                .collect(),
        );
        assert_eq!(
            group_match(&node, Value::from("on 2024-05")).unwrap(),
            Value::from("2024")
        );
        assert_eq!(group_match(&node, Value::from("none")).unwrap(), Value::Null);

        let node = UnitNode::new("value", [("split", r"\s*,\s*")].into_iter().collect());
        assert_eq!(
            group_match(&node, Value::from("a , b,c")).unwrap(),
            Value::List(vec!["a".into(), "b".into(), "c".into()])
        );

        let node = UnitNode::new("value", [("split", "(")].into_iter().collect());
        assert!(matches!(
            group_match(&node, Value::from("a")),
            Err(crate::error::EngineError::Pattern(_))
        ));
    }

    #[test]
    fn test_group_match_patterns_are_cached() {
        let pattern = r"(?P<n>\d+)-cached";
        let node = UnitNode::new("value", [("match", pattern)].into_iter().collect());
        for _ in 0..2 {
            assert_eq!(
                group_match(&node, Value::from("7-cached")).unwrap(),
                Value::from("7-cached")
            );
        }
        let cached = crate::expr::functions::PATTERNS
            .lock()
            .unwrap()
            .contains_key(pattern);
        assert!(cached);
    }

    #[test]
    fn test_collapse() {
        assert_eq!(collapse(vec![]), Value::Null);
        assert_eq!(collapse(vec![Value::Int(3)]), Value::Int(3));
        assert_eq!(
            collapse(vec![Value::from("a"), Value::Int(3)]),
            Value::from("a3")
        );
    }
}
