/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The expression language.
//!
//! Attribute values and text may embed interpolations:
//!
//! ```text
//! Hello ${ upper(@input.name) }!     interpolation
//! costs $${price}                    escaped, renders "costs ${price}"
//! ```
//!
//! [`parse`] returns `None` for text without any expression syntax. A text
//! that is exactly one interpolation evaluates to the raw [`Value`];
//! anything else evaluates to the concatenated text.
//!
//! Condition `test` attributes and `transform` attributes hold bare
//! expressions (see [`evaluate_condition`] and [`evaluate_expression`]).

pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use eval::EvalContext;
pub use functions::{Function, FunctionRegistry};
pub use parser::Expr;

use crate::error::{EngineError, EngineResult};
use crate::value::Value;
use parser::parse_expr;

/// How much of a text is evaluated.
///
/// Each extent includes the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extent {
    /// Leave the text untouched.
    None,
    /// Only process `$${` escapes.
    Literal,
    /// Also evaluate interpolations that are plain variable or path
    /// references.
    Variables,
    /// Evaluate everything.
    #[default]
    Full,
}

impl Extent {
    /// Parse an `eval` attribute value. Unknown values mean [`Extent::Full`].
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("none") | Some("false") => Extent::None,
            Some("literal") => Extent::Literal,
            Some("variables") => Extent::Variables,
            _ => Extent::Full,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Interpolation { source: String, expr: Expr },
}

/// A parsed template string.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    text: String,
    segments: Vec<Segment>,
}

impl Expression {
    /// The original text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when the text contains at least one interpolation.
    pub fn is_dynamic(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Interpolation { .. }))
    }

    /// Evaluate with [`Extent::Full`].
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> EngineResult<Value> {
        self.evaluate_with(Extent::Full, ctx)
    }

    pub fn evaluate_with(&self, extent: Extent, ctx: &EvalContext<'_>) -> EngineResult<Value> {
        let evaluates = |expr: &Expr| match extent {
            Extent::None | Extent::Literal => false,
            Extent::Variables => expr.is_reference(),
            Extent::Full => true,
        };

        if extent == Extent::None {
            return Ok(Value::String(self.text.clone()));
        }

        if let [Segment::Interpolation { expr, .. }] = self.segments.as_slice() {
            if evaluates(expr) {
                return eval::eval_expr(expr, &self.text, ctx);
            }
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Interpolation { expr, .. } if evaluates(expr) => {
                    out.push_str(&eval::eval_expr(expr, &self.text, ctx)?.to_text());
                }
                Segment::Interpolation { source, .. } => {
                    out.push_str("${");
                    out.push_str(source);
                    out.push('}');
                }
            }
        }
        Ok(Value::String(out))
    }
}

/// Find the `}` closing an interpolation whose body starts at `from`,
/// skipping braces inside quoted strings.
fn find_close(text: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in text[from..].char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '}' => return Some(from + offset),
                _ => {}
            },
        }
    }
    None
}

/// Parse a template string. Returns `None` when the text contains no
/// expression syntax at all.
pub fn parse(text: &str) -> EngineResult<Option<Expression>> {
    if !text.contains("${") {
        return Ok(None);
    }

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        if rest.starts_with("$${") {
            literal.push_str("${");
            pos += 3;
        } else if rest.starts_with("${") {
            let close = find_close(text, pos + 2).ok_or_else(|| EngineError::ExpressionParse {
                text: text.to_string(),
                message: "unterminated interpolation".to_string(),
            })?;
            let source = text[pos + 2..close].trim().to_string();
            let expr = parse_expr(&source)?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Interpolation { source, expr });
            pos = close + 1;
        } else {
            let c = rest.chars().next().unwrap_or_default();
            literal.push(c);
            pos += c.len_utf8().max(1);
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(Some(Expression {
        text: text.to_string(),
        segments,
    }))
}

/// True if the text contains an interpolation. Unparseable text is not
/// dynamic.
pub fn is_dynamic(text: &str) -> bool {
    matches!(parse(text), Ok(Some(expr)) if expr.is_dynamic())
}

/// Evaluate a template string at the given extent.
pub fn evaluate_template(text: &str, extent: Extent, ctx: &EvalContext<'_>) -> EngineResult<Value> {
    if extent == Extent::None {
        return Ok(Value::String(text.to_string()));
    }
    match parse(text)? {
        Some(expr) => expr.evaluate_with(extent, ctx),
        None => Ok(Value::String(text.to_string())),
    }
}

/// Best-effort evaluation: the computed value and `true`, or the raw text
/// and `false` when evaluation fails or yields null.
pub fn evaluate_or_raw(text: &str, ctx: &EvalContext<'_>) -> (Value, bool) {
    match evaluate_template(text, Extent::Full, ctx) {
        Ok(Value::Null) => (Value::String(text.to_string()), false),
        Ok(value) => (value, true),
        Err(err) => {
            tracing::debug!(text, error = %err, "Falling back to raw text");
            (Value::String(text.to_string()), false)
        }
    }
}

/// Strip a single enclosing `${...}` from a bare expression.
fn unwrap_interpolation(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with("${") && find_close(trimmed, 2) == Some(trimmed.len() - 1) {
        &trimmed[2..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// Evaluate a bare expression such as `count > 2`. A `${...}` wrapper is
/// tolerated.
pub fn evaluate_expression(text: &str, ctx: &EvalContext<'_>) -> EngineResult<Value> {
    let source = unwrap_interpolation(text);
    let expr = parse_expr(source)?;
    eval::eval_expr(&expr, text, ctx)
}

/// Evaluate a bare expression for its truthiness.
pub fn evaluate_condition(text: &str, ctx: &EvalContext<'_>) -> EngineResult<bool> {
    Ok(evaluate_expression(text, ctx)?.is_truthy())
}
