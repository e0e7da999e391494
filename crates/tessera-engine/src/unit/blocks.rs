/*
 * blocks.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Lifecycle blocks: `init`, `final` and `using`.
//!
//! These are slots of their parent rather than values of their own; the
//! lifecycle runs them from `before` and `after`.

use super::{Unit, UnitKind, UnitNode, unit_node_impl};

#[derive(Debug, Clone)]
pub struct Steps {
    node: UnitNode,
    kind: UnitKind,
}

impl Steps {
    /// `kind` is `Init`, `Final` or `Using`.
    pub fn new(kind: UnitKind, node: UnitNode) -> Self {
        debug_assert!(matches!(
            kind,
            UnitKind::Init | UnitKind::Final | UnitKind::Using
        ));
        Self { node, kind }
    }
}

impl Unit for Steps {
    unit_node_impl!();

    fn kind(&self) -> UnitKind {
        self.kind
    }

    fn accepts(&self, kind: UnitKind) -> bool {
        kind.is_value() && kind != UnitKind::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::engine::Engine;
    use crate::lifecycle::evaluate;
    use crate::unit::container::Block;
    use crate::unit::data::{Set, ValueOf};
    use crate::value::Value;

    fn node(tag: &str, attrs: &[(&str, &str)]) -> UnitNode {
        UnitNode::new(tag, attrs.iter().copied().collect::<Attributes>())
    }

    #[test]
    fn test_using_binds_for_descendants_only() {
        let mut rt = Engine::builder().build().runtime();

        let using = Steps::new(UnitKind::Using, node("using", &[("greeting", "hi")]));
        let mut block = Block::new(node("block", &[]));
        block.accept(Box::new(using)).unwrap();
        block
            .accept(Box::new(ValueOf::new(node("value-of", &[("var", "greeting")]))))
            .unwrap();

        assert_eq!(evaluate(&block, &mut rt).unwrap(), Value::from("hi"));
        assert_eq!(rt.var("greeting"), None);
    }

    #[test]
    fn test_init_and_final_run_around_compute() {
        let mut rt = Engine::builder().build().runtime();
        rt.write("log", "seen", Value::from(""), true).unwrap();

        let mut init = Steps::new(UnitKind::Init, node("init", &[]));
        init.accept(Box::new(Set::new(node(
            "set",
            &[("context", "log"), ("key", "init"), ("value", "yes")],
        ))))
        .unwrap();
        let mut finalizer = Steps::new(UnitKind::Final, node("final", &[]));
        finalizer
            .accept(Box::new(Set::new(node(
                "set",
                &[("context", "log"), ("key", "final"), ("value", "${@log.init}")],
            ))))
            .unwrap();

        let mut block = Block::new(node("block", &[]));
        block.accept(Box::new(init)).unwrap();
        block.accept(Box::new(finalizer)).unwrap();
        assert!(block.node().init.is_some());
        assert!(block.node().finalizer.is_some());
        assert!(block.node().children.is_empty());

        evaluate(&block, &mut rt).unwrap();
        assert_eq!(rt.read("log", "final"), Some(&Value::from("yes")));
    }
}
