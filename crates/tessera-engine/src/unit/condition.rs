/*
 * condition.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Condition units: `on`, `break`, `all`, `any`, `not`.
//!
//! Each combines its own `test` expression with its child conditions:
//!
//! | kind | result |
//! |---|---|
//! | `on`, `break`, `all` | `test` and every child |
//! | `any` | `test` or any child |
//! | `not` | not (`test` and every child) |

use super::{Conditional, Unit, UnitKind, UnitNode, unit_node_impl};
use crate::context::RuntimeContext;
use crate::error::EngineResult;
use crate::expr;

#[derive(Debug, Clone)]
pub struct Condition {
    node: UnitNode,
    kind: UnitKind,
}

impl Condition {
    /// `kind` must be one of the condition kinds.
    pub fn new(kind: UnitKind, node: UnitNode) -> Self {
        debug_assert!(kind.is_condition());
        Self { node, kind }
    }

    fn test(&self, rt: &RuntimeContext) -> EngineResult<Option<bool>> {
        match self.node.attribute("test") {
            Some(test) => expr::evaluate_condition(test, &self.node.eval_context(rt)).map(Some),
            None => Ok(None),
        }
    }

    fn child_matches(&self, rt: &RuntimeContext) -> impl Iterator<Item = EngineResult<bool>> {
        self.node
            .children
            .iter()
            .filter_map(|c| c.as_conditional())
            .map(move |c| c.matches(rt))
    }

    fn conjunction(&self, rt: &RuntimeContext) -> EngineResult<bool> {
        if self.test(rt)? == Some(false) {
            return Ok(false);
        }
        for matched in self.child_matches(rt) {
            if !matched? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn disjunction(&self, rt: &RuntimeContext) -> EngineResult<bool> {
        if self.test(rt)? == Some(true) {
            return Ok(true);
        }
        for matched in self.child_matches(rt) {
            if matched? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Unit for Condition {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        self.kind
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind.is_condition() && kind != UnitKind::Break
    }

    fn as_conditional(&self) -> Option<&dyn Conditional> {
        Some(self)
    }
}

impl Conditional for Condition {
    fn matches(&self, rt: &RuntimeContext) -> EngineResult<bool> {
        match self.kind {
            UnitKind::Any => self.disjunction(rt),
            UnitKind::Not => Ok(!self.conjunction(rt)?),
            _ => self.conjunction(rt),
        }
    }
}
