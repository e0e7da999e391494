/*
 * eval.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression evaluation.

use super::functions::FunctionRegistry;
use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::attributes::NS_PREFIX;
use crate::context::RuntimeContext;
use crate::error::{EngineError, EngineResult};
use crate::unit::UnitNode;
use crate::value::Value;
use std::cmp::Ordering;

/// Everything an expression can see while it is evaluated.
///
/// `unit` is the unit that owns the expression text; its namespace prefix
/// selects where unqualified function calls start. `this` is bound for
/// transform expressions. `source` is a fallback for variable lookups that
/// miss the internal scope.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub unit: Option<&'a UnitNode>,
    pub runtime: &'a RuntimeContext,
    pub this: Option<&'a Value>,
    pub source: Option<&'a Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(runtime: &'a RuntimeContext) -> Self {
        Self {
            unit: None,
            runtime,
            this: None,
            source: None,
        }
    }

    pub fn for_unit(unit: &'a UnitNode, runtime: &'a RuntimeContext) -> Self {
        Self {
            unit: Some(unit),
            ..Self::new(runtime)
        }
    }

    pub fn with_this(mut self, this: &'a Value) -> Self {
        self.this = Some(this);
        self
    }

    pub fn with_source(mut self, source: &'a Value) -> Self {
        self.source = Some(source);
        self
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.runtime.services().functions
    }

    /// Namespace that unqualified calls start from.
    fn call_namespace(&self) -> &str {
        self.unit
            .and_then(|u| u.attributes.get(NS_PREFIX))
            .filter(|prefix| self.functions().has_namespace(prefix))
            .unwrap_or(FunctionRegistry::ROOT)
    }
}

/// Evaluate a parsed expression. `text` is only used for error messages.
pub fn eval_expr(expr: &Expr, text: &str, ctx: &EvalContext<'_>) -> EngineResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Var(name) if name == "this" => Ok(ctx.this.cloned().unwrap_or_default()),

        Expr::Var(name) => Ok(ctx
            .runtime
            .var(name)
            .or_else(|| ctx.source.and_then(|s| s.get_path(&[name.as_str()])))
            .cloned()
            .unwrap_or_default()),

        Expr::External(name) => Ok(ctx
            .runtime
            .external()
            .get(name)
            .map(|m| Value::Map(m.clone()))
            .unwrap_or_default()),

        Expr::Field(base, field) => {
            let base = eval_expr(base, text, ctx)?;
            Ok(base.get_path(&[field.as_str()]).cloned().unwrap_or_default())
        }

        Expr::Index(base, index) => {
            let base = eval_expr(base, text, ctx)?;
            let index = eval_expr(index, text, ctx)?;
            Ok(lookup_index(&base, &index))
        }

        Expr::Call {
            namespace,
            name,
            args,
        } => {
            let ns = namespace.as_deref().unwrap_or_else(|| ctx.call_namespace());
            let function = ctx.functions().resolve(ns, name).ok_or_else(|| {
                EngineError::UnknownFunction {
                    namespace: ns.to_string(),
                    name: name.clone(),
                }
            })?;
            let values = args
                .iter()
                .map(|arg| eval_expr(arg, text, ctx))
                .collect::<EngineResult<Vec<_>>>()?;
            function(&values, ctx)
        }

        Expr::Unary(op, operand) => {
            let value = eval_expr(operand, text, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value {
                    Value::Int(i) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| EngineError::eval(text, "integer overflow")),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(EngineError::eval(
                        text,
                        format!("cannot negate {}", other.type_name()),
                    )),
                },
            }
        }

        Expr::Binary(BinaryOp::And, left, right) => {
            if !eval_expr(left, text, ctx)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(right, text, ctx)?.is_truthy()))
        }

        Expr::Binary(BinaryOp::Or, left, right) => {
            if eval_expr(left, text, ctx)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(right, text, ctx)?.is_truthy()))
        }

        Expr::Binary(op, left, right) => {
            let left = eval_expr(left, text, ctx)?;
            let right = eval_expr(right, text, ctx)?;
            binary(*op, left, right, text)
        }
    }
}

fn lookup_index(base: &Value, index: &Value) -> Value {
    match (base, index) {
        (Value::List(items), _) => index
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or_default(),
        (Value::Seq(seq), _) => index
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| seq.iter().nth(i))
            .unwrap_or_default(),
        (Value::Map(map), _) => map.get(&index.to_text()).cloned().unwrap_or_default(),
        _ => Value::Null,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value, text: &str) -> EngineResult<Value> {
    let type_error = |left: &Value, right: &Value| {
        EngineError::eval(
            text,
            format!(
                "unsupported operands for {:?}: {} and {}",
                op,
                left.type_name(),
                right.type_name()
            ),
        )
    };

    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right).ok_or_else(|| type_error(&left, &right))?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add => match (&left, &right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", left.to_text(), right.to_text())))
            }
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => arithmetic(op, &left, &right, text)
                .unwrap_or_else(|| Err(type_error(&left, &right))),
        },
        BinaryOp::Div | BinaryOp::Mod if is_zero(&right) => {
            Err(EngineError::eval(text, "division by zero"))
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, &left, &right, text).unwrap_or_else(|| Err(type_error(&left, &right)))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Int(i) => *i == 0,
        Value::Float(f) => *f == 0.0,
        _ => false,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// `None` when the operands do not support `op`. Divisors are nonzero here.
fn arithmetic(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    text: &str,
) -> Option<EngineResult<Value>> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div => match a.checked_rem(*b) {
                    Some(0) => a.checked_div(*b),
                    Some(_) => return Some(Ok(Value::Float(*a as f64 / *b as f64))),
                    None => None,
                },
                BinaryOp::Mod => a.checked_rem(*b),
                _ => return None,
            };
            Some(
                result
                    .map(Value::Int)
                    .ok_or_else(|| EngineError::eval(text, "integer overflow")),
            )
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = (left.as_f64()?, right.as_f64()?);
            Some(Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => return None,
            })))
        }
        _ => None,
    }
}
