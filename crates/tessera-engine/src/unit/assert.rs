/*
 * assert.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The `assert` unit.

use super::{
    Conditional, Evaluable, Executable, Satisfiable, Unit, UnitKind, UnitNode, unit_node_impl,
};
use crate::context::RuntimeContext;
use crate::error::{EngineError, EngineResult};
use crate::expr;
use crate::value::Value;

/// Fails the evaluation with [`EngineError::Assertion`] unless its `test`
/// expression and every child condition hold.
#[derive(Debug, Clone)]
pub struct Assert {
    node: UnitNode,
}

impl Assert {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }
}

impl Unit for Assert {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Assert
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind.is_condition()
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }

    fn as_conditional(&self) -> Option<&dyn Conditional> {
        Some(self)
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

impl Conditional for Assert {
    fn matches(&self, rt: &RuntimeContext) -> EngineResult<bool> {
        if let Some(test) = self.node.attribute("test") {
            if !expr::evaluate_condition(test, &self.node.eval_context(rt))? {
                return Ok(false);
            }
        }
        for child in &self.node.children {
            if let Some(condition) = child.as_conditional() {
                if !condition.matches(rt)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

impl Satisfiable for Assert {}

impl Evaluable for Assert {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        if self.matches(rt)? {
            return Ok(Value::Bool(true));
        }
        Err(EngineError::Assertion {
            id: self.computed_id(rt).unwrap_or_else(|| "assert".to_string()),
            message: self
                .node
                .computed_attribute("message", rt)
                .unwrap_or_else(|| "assertion failed".to_string()),
        })
    }

    fn no_value(&self) -> Value {
        Value::Bool(false)
    }
}

impl Executable for Assert {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::engine::Engine;
    use crate::lifecycle::evaluate;
    use crate::unit::condition::Condition;

    fn assert_unit(attrs: &[(&str, &str)]) -> Assert {
        Assert::new(UnitNode::new(
            "assert",
            attrs.iter().copied().collect::<Attributes>(),
        ))
    }

    #[test]
    fn test_assert_passes_and_fails() {
        let mut rt = Engine::builder().build().runtime();
        rt.set_var("n", Value::Int(3));

        let ok = assert_unit(&[("test", "n == 3")]);
        assert_eq!(evaluate(&ok, &mut rt).unwrap(), Value::Bool(true));

        let failing = assert_unit(&[("id", "positive"), ("test", "n < 0"), ("message", "n=${n}")]);
        match evaluate(&failing, &mut rt) {
            Err(EngineError::Assertion { id, message }) => {
                assert_eq!(id, "positive");
                assert_eq!(message, "n=3");
            }
            other => panic!("expected assertion error, got {:?}", other),
        }
    }

    #[test]
    fn test_guarded_assert_yields_false() {
        let mut rt = Engine::builder().build().runtime();
        let mut unit = assert_unit(&[("test", "false")]);
        unit.accept(Box::new(Condition::new(
            UnitKind::On,
            UnitNode::new("on", [("test", "false")].into_iter().collect()),
        )))
        .unwrap();
        assert!(unit.node().guard.is_some());
        assert_eq!(evaluate(&unit, &mut rt).unwrap(), Value::Bool(false));
    }
}
