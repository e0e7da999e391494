/*
 * loops.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The `loop` unit.
//!
//! A loop runs its `using`, `init` and `final` blocks once around the whole
//! iteration instead of once per body, so it replaces the default `before`
//! and `after` hooks with no-ops and calls the prologue and epilogue from
//! `compute`.
//!
//! Inputs are read from attributes first and from internal variables of
//! the same name second:
//!
//! | input | meaning |
//! |---|---|
//! | `iterable` | list, sequence, map, or a single item |
//! | `start`, `end`, `times` | counted iteration (`end` is exclusive) |
//! | `joiner` | separator for accumulated results, default `,` |
//! | `join` | accumulate (default) or keep the last raw result |
//! | `delay` | pause between iterations, in milliseconds |
//! | `scoped-vars` | prefix state variables with `<id>_` |
//!
//! State variables: `index`, `key`, `item`, `last`, `accumulated`.

use super::{Evaluable, Executable, Satisfiable, Unit, UnitKind, UnitNode, unit_node_impl};
use crate::context::RuntimeContext;
use crate::error::EngineResult;
use crate::lifecycle;
use crate::value::Value;
use std::time::Duration;

const STATE_VARS: [&str; 5] = ["index", "key", "item", "last", "accumulated"];

#[derive(Debug, Clone)]
pub struct Loop {
    node: UnitNode,
}

/// One step of an iteration source.
struct Step {
    index: i64,
    key: Value,
    item: Value,
}

type StepIter<'a> = Box<dyn Iterator<Item = Step> + 'a>;

impl Loop {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }

    /// An input from the attribute, else from the internal variable.
    fn input(&self, key: &str, rt: &RuntimeContext) -> EngineResult<Option<Value>> {
        if self.node.attributes.contains(key) {
            return self.node.eval_attribute(key, rt);
        }
        Ok(rt.var(key).cloned())
    }

    fn int_input(&self, key: &str, rt: &RuntimeContext) -> EngineResult<Option<i64>> {
        Ok(self
            .input(key, rt)?
            .filter(|v| !v.is_null())
            .and_then(|v| {
                let parsed = v.as_i64();
                if parsed.is_none() {
                    tracing::debug!(input = key, value = %v, "Ignoring non-integer loop input");
                }
                parsed
            }))
    }

    fn flag_input(&self, key: &str, default: bool, rt: &RuntimeContext) -> EngineResult<bool> {
        Ok(self
            .input(key, rt)?
            .map(|v| v.is_truthy())
            .unwrap_or(default))
    }

    /// State variable names, prefixed with the loop id when `scoped-vars`
    /// is set.
    fn state_names(&self, rt: &RuntimeContext) -> EngineResult<[String; 5]> {
        let prefix = if self.flag_input("scoped-vars", false, rt)? {
            self.computed_id(rt)
                .map(|id| format!("{}_", id))
                .unwrap_or_default()
        } else {
            String::new()
        };
        Ok(STATE_VARS.map(|name| format!("{}{}", prefix, name)))
    }

    fn counted(&self, rt: &RuntimeContext) -> EngineResult<StepIter<'static>> {
        let start = self.int_input("start", rt)?;
        let end = self.int_input("end", rt)?;
        let times = self.int_input("times", rt)?;

        let counter = |index: i64| Step {
            index,
            key: Value::Int(index),
            item: Value::Int(index),
        };
        let steps: StepIter<'static> = match (start, end, times) {
            (None, None, None) => Box::new(std::iter::empty()),
            (start, Some(end), _) => {
                let start = start.unwrap_or(0);
                if end < start {
                    Box::new(((end + 1)..=start).rev().map(counter))
                } else {
                    Box::new((start..end).map(counter))
                }
            }
            (start, None, Some(times)) => {
                let start = start.unwrap_or(0);
                Box::new((start..start.saturating_add(times.max(0))).map(counter))
            }
            (Some(start), None, None) => Box::new((start..).map(counter)),
        };
        Ok(steps)
    }

    fn over<'a>(iterable: &'a Value) -> StepIter<'a> {
        match iterable {
            Value::Null => Box::new(std::iter::empty()),
            Value::List(items) => Box::new(items.iter().enumerate().map(|(i, item)| Step {
                index: i as i64,
                key: Value::Int(i as i64),
                item: item.clone(),
            })),
            Value::Seq(seq) => Box::new(seq.iter().enumerate().map(|(i, item)| Step {
                index: i as i64,
                key: Value::Int(i as i64),
                item,
            })),
            Value::Map(map) => Box::new(map.iter().enumerate().map(|(i, (k, v))| Step {
                index: i as i64,
                key: Value::from(k.as_str()),
                item: v.clone(),
            })),
            single => Box::new(std::iter::once(Step {
                index: 0,
                key: Value::Int(0),
                item: single.clone(),
            })),
        }
    }

    fn should_break(&self, rt: &RuntimeContext) -> EngineResult<bool> {
        for stop in self.node.children_of_kind(UnitKind::Break) {
            if let Some(condition) = stop.as_conditional() {
                if condition.matches(rt)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// One body pass: a single emitter keeps its raw value, several are
    /// concatenated.
    fn body(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let mut emitted: Vec<Value> = lifecycle::emitted(&self.node.children, rt)?
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        Ok(match emitted.len() {
            0 => Value::Null,
            1 => emitted.pop().unwrap_or_default(),
            _ => Value::String(lifecycle::concat(&emitted)),
        })
    }

    fn iterate(&self, names: &[String; 5], rt: &mut RuntimeContext) -> EngineResult<Value> {
        let join = self.flag_input("join", true, rt)?;
        let joiner = self
            .input("joiner", rt)?
            .map(|v| v.to_text())
            .unwrap_or_else(|| ",".to_string());
        let delay = self
            .int_input("delay", rt)?
            .filter(|ms| *ms > 0)
            .map(|ms| Duration::from_millis(ms as u64));

        let iterable = if self.node.attributes.contains("iterable") || rt.var("iterable").is_some() {
            Some(self.input("iterable", rt)?.unwrap_or_default())
        } else {
            None
        };
        let steps = match &iterable {
            Some(iterable) => Self::over(iterable),
            None => self.counted(rt)?,
        };

        let [index_var, key_var, item_var, last_var, accumulated_var] = names;
        let mut parts: Vec<String> = Vec::new();
        let mut last = Value::Null;

        for (n, step) in steps.enumerate() {
            if n > 0 {
                if let Some(delay) = delay {
                    std::thread::sleep(delay);
                }
            }
            rt.set_var(index_var.as_str(), Value::Int(step.index));
            rt.set_var(key_var.as_str(), step.key);
            rt.set_var(item_var.as_str(), step.item);
            rt.set_var(last_var.as_str(), last.clone());
            let accumulated = if join {
                Value::String(parts.join(&joiner))
            } else {
                last.clone()
            };
            rt.set_var(accumulated_var.as_str(), accumulated);

            if self.should_break(rt)? {
                tracing::trace!(index = step.index, "Loop stopped by break");
                break;
            }

            let result = self.body(rt)?;
            tracing::trace!(index = step.index, result = %result, "Loop iteration");
            if join {
                let text = result.to_text();
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            last = result;
        }

        Ok(if join {
            Value::String(parts.join(&joiner))
        } else {
            last
        })
    }
}

impl Unit for Loop {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Loop
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind.is_value() || kind == UnitKind::Break
    }

    fn is_container(&self) -> bool {
        true
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

impl Satisfiable for Loop {}

impl Evaluable for Loop {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        lifecycle::prologue(&self.node, rt)?;
        let names = self.state_names(rt)?;
        let result = self.iterate(&names, rt);
        for name in &names {
            rt.remove_var(name);
        }
        let value = result?;
        lifecycle::epilogue(&self.node, rt)?;
        Ok(value)
    }

    fn no_value(&self) -> Value {
        Value::from("")
    }

    fn before(&self, _rt: &mut RuntimeContext) -> EngineResult<()> {
        Ok(())
    }

    fn after(&self, _value: &Value, _rt: &mut RuntimeContext) -> EngineResult<()> {
        Ok(())
    }
}

impl Executable for Loop {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::engine::Engine;
    use crate::lifecycle::evaluate;
    use crate::unit::blocks::Steps as Block;
    use crate::unit::condition::Condition;
    use crate::unit::data::ValueOf;
    use crate::unit::text::Text;
    use crate::value::Sequence;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn node(tag: &str, attrs: &[(&str, &str)]) -> UnitNode {
        UnitNode::new(tag, attrs.iter().copied().collect::<Attributes>())
    }

    fn counted(attrs: &[(&str, &str)], body: &str) -> Loop {
        let mut unit = Loop::new(node("loop", attrs));
        unit.node_mut().children.push(Arc::new(Text::new(body)));
        unit
    }

    fn run(unit: &Loop) -> Value {
        let mut rt = Engine::builder().build().runtime();
        evaluate(unit, &mut rt).unwrap()
    }

    #[test]
    fn test_counted_ascending_and_descending() {
        assert_eq!(run(&counted(&[("start", "0"), ("end", "3")], "${index}")), Value::from("0,1,2"));
        assert_eq!(run(&counted(&[("start", "3"), ("end", "0")], "${index}")), Value::from("3,2,1"));
        assert_eq!(run(&counted(&[("start", "2"), ("times", "2")], "${index}")), Value::from("2,3"));
        assert_eq!(run(&counted(&[("end", "2")], "${index}")), Value::from("0,1"));
    }

    #[test]
    fn test_no_counting_inputs_runs_zero_times() {
        assert_eq!(run(&counted(&[], "${index}")), Value::from(""));
    }

    #[test]
    fn test_open_ended_stops_at_break() {
        let mut unit = counted(&[("start", "0"), ("joiner", "-")], "${index}");
        unit.accept(Box::new(Condition::new(
            UnitKind::Break,
            node("break", &[("test", "index >= 3")]),
        )))
        .unwrap();
        assert_eq!(run(&unit), Value::from("0-1-2"));
    }

    #[test]
    fn test_join_skips_empty_results() {
        let mut rt = Engine::builder().build().runtime();
        rt.set_var(
            "words",
            Value::List(vec![Value::from("a"), Value::from(""), Value::from("b")]),
        );
        let mut unit = Loop::new(node("loop", &[("iterable", "${words}")]));
        unit.node_mut()
            .children
            .push(Arc::new(ValueOf::new(node("value-of", &[("var", "item")]))));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::from("a,b"));
    }

    #[test]
    fn test_without_join_keeps_last_raw_value() {
        let mut rt = Engine::builder().build().runtime();
        rt.set_var("iterable", Value::List(vec![Value::Int(1), Value::Int(7)]));
        let mut unit = Loop::new(node("loop", &[("join", "false")]));
        unit.node_mut()
            .children
            .push(Arc::new(ValueOf::new(node("value-of", &[("var", "item")]))));
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_map_and_sequence_sources() {
        let mut rt = Engine::builder().build().runtime();
        rt.set_var(
            "prices",
            Value::from_json(&serde_json::json!({"tea": 3, "cake": 5})),
        );
        rt.set_var("steps", Value::Seq(Sequence::range(10, 13, 1)));

        let unit = counted(&[("iterable", "${prices}")], "${key}=${item}");
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::from("tea=3,cake=5"));

        let unit = counted(&[("iterable", "${steps}")], "${index}:${item}");
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::from("0:10,1:11,2:12"));

        let unit = counted(&[("iterable", "${missing}")], "x");
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::from(""));

        let unit = counted(&[("iterable", "solo")], "${item}!");
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::from("solo!"));
    }

    #[test]
    fn test_state_is_removed_after_failure() {
        let mut rt = Engine::builder().build().runtime();
        rt.set_var("outer", Value::Int(1));
        let unit = counted(&[("times", "2")], "${1 / 0}");
        assert!(evaluate(&unit, &mut rt).is_err());
        assert_eq!(rt.var("index"), None);
        assert_eq!(rt.var("item"), None);
        assert_eq!(rt.var("outer"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_scoped_vars_and_accumulated() {
        let unit = counted(
            &[("id", "outer"), ("times", "3"), ("scoped-vars", "true")],
            "${outer_index}[${outer_accumulated}]",
        );
        assert_eq!(run(&unit), Value::from("0[],1[0[]],2[0[],1[0[]]]"));
    }

    #[test]
    fn test_init_runs_once() {
        let mut rt = Engine::builder().build().runtime();
        rt.write("stats", "runs", Value::Int(0), true).unwrap();

        let mut init = Block::new(UnitKind::Init, node("init", &[]));
        init.accept(Box::new(crate::unit::data::Set::new(node(
            "set",
            &[("context", "stats"), ("key", "runs"), ("value", "${@stats.runs + 1}")],
        ))))
        .unwrap();

        let mut unit = counted(&[("times", "3")], "${index}");
        unit.accept(Box::new(init)).unwrap();
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::from("0,1,2"));
        assert_eq!(rt.read("stats", "runs"), Some(&Value::Int(1)));
    }
}
