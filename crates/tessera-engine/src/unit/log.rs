/*
 * log.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The `log` unit: emits its message as a tracing event on target
//! `tessera::log` at `level` (`trace`, `debug`, `info`, `warn`, `error`).

use super::{Evaluable, Executable, Satisfiable, Unit, UnitKind, UnitNode, unit_node_impl};
use crate::context::RuntimeContext;
use crate::error::EngineResult;
use crate::lifecycle;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Log {
    node: UnitNode,
}

impl Log {
    pub fn new(node: UnitNode) -> Self {
        Self { node }
    }

    fn message(&self, rt: &mut RuntimeContext) -> EngineResult<String> {
        if let Some(message) = self.node.computed_attribute("message", rt) {
            return Ok(message);
        }
        let values: Vec<Value> = lifecycle::emitted(&self.node.children, rt)?
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        Ok(lifecycle::concat(&values))
    }
}

impl Unit for Log {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        UnitKind::Log
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind.is_value()
    }

    fn fallback_id_key(&self) -> Option<&'static str> {
        Some("name")
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }

    fn as_executable(&self) -> Option<&dyn Executable> {
        Some(self)
    }
}

impl Satisfiable for Log {}

impl Evaluable for Log {
    fn compute(&self, rt: &mut RuntimeContext) -> EngineResult<Value> {
        let message = self.message(rt)?;
        let name = self.computed_id(rt).unwrap_or_default();
        match self.node.attribute("level").map(str::trim) {
            Some("trace") => tracing::trace!(target: "tessera::log", name = %name, "{}", message),
            Some("debug") => tracing::debug!(target: "tessera::log", name = %name, "{}", message),
            Some("warn") => tracing::warn!(target: "tessera::log", name = %name, "{}", message),
            Some("error") => tracing::error!(target: "tessera::log", name = %name, "{}", message),
            _ => tracing::info!(target: "tessera::log", name = %name, "{}", message),
        }
        Ok(Value::Null)
    }
}

impl Executable for Log {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::engine::Engine;
    use crate::unit::text::Text;
    use std::sync::Arc;

    #[test]
    fn test_log_yields_null_and_reads_children() {
        let mut rt = Engine::builder().build().runtime();
        rt.set_var("n", Value::Int(2));
        let mut log = Log::new(UnitNode::new(
            "log",
            [("level", "debug")].into_iter().collect::<Attributes>(),
        ));
        log.node_mut().children.push(Arc::new(Text::new("n is ${n}")));

        assert_eq!(log.message(&mut rt).unwrap(), "n is 2");
        assert_eq!(log.execute(&mut rt).unwrap(), Value::Null);
    }
}
