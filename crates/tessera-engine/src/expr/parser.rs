/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression AST and recursive-descent parser.
//!
//! Precedence, loosest first: `||`, `&&`, comparisons, `+ -`, `* / %`,
//! unary `! -`, then postfix `.field` and `[index]`.

use super::lexer::{Token, tokenize};
use crate::error::{EngineError, EngineResult};
use crate::value::Value;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),

    /// A variable from the internal scope, or `this`.
    Var(String),

    /// `@name`: a named external map.
    External(String),

    /// `base.field`
    Field(Box<Expr>, String),

    /// `base[index]`
    Index(Box<Expr>, Box<Expr>),

    /// `name(args)` or `ns:name(args)`
    Call {
        namespace: Option<String>,
        name: String,
        args: Vec<Expr>,
    },

    Unary(UnaryOp, Box<Expr>),

    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Expr {
    /// True for plain references: variables, external maps, and paths into
    /// them with literal indices.
    pub fn is_reference(&self) -> bool {
        match self {
            Expr::Var(_) | Expr::External(_) => true,
            Expr::Field(base, _) => base.is_reference(),
            Expr::Index(base, index) => {
                base.is_reference() && matches!(index.as_ref(), Expr::Literal(_))
            }
            _ => false,
        }
    }
}

/// Parse expression text (the inside of `${...}`, or a bare condition).
pub fn parse_expr(text: &str) -> EngineResult<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        text,
        tokens,
        pos: 0,
    };
    if parser.tokens.is_empty() {
        return Err(parser.error("empty expression"));
    }
    let expr = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error(&format!(
            "unexpected token {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> EngineError {
        EngineError::ExpressionParse {
            text: self.text.to_string(),
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> EngineResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", token)))
        }
    }

    fn or(&mut self) -> EngineResult<Expr> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> EngineResult<Expr> {
        let mut left = self.comparison()?;
        while self.eat(&Token::AndAnd) {
            let right = self.comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> EngineResult<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> EngineResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> EngineResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> EngineResult<Expr> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> EngineResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let field = match self.tokens.get(self.pos).cloned() {
                    Some(Token::Ident(name)) => name,
                    Some(Token::Int(i)) => i.to_string(),
                    _ => return Err(self.error("expected field name after '.'")),
                };
                self.pos += 1;
                expr = Expr::Field(Box::new(expr), field);
            } else if self.eat(&Token::LBracket) {
                let index = self.or()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> EngineResult<Expr> {
        let Some(token) = self.tokens.get(self.pos).cloned() else {
            return Err(self.error("unexpected end of expression"));
        };
        self.pos += 1;
        match token {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::LParen => {
                let inner = self.or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::At => match self.tokens.get(self.pos).cloned() {
                Some(Token::Ident(name)) => {
                    self.pos += 1;
                    Ok(Expr::External(name))
                }
                _ => Err(self.error("expected context name after '@'")),
            },
            Token::Ident(name) => self.identifier(name),
            other => Err(self.error(&format!("unexpected token {:?}", other))),
        }
    }

    fn identifier(&mut self, name: String) -> EngineResult<Expr> {
        match name.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }

        // ns:name(...)
        if self.peek() == Some(&Token::Colon) {
            if let Some(Token::Ident(function)) = self.tokens.get(self.pos + 1).cloned() {
                self.pos += 2;
                self.expect(&Token::LParen)?;
                let args = self.arguments()?;
                return Ok(Expr::Call {
                    namespace: Some(name),
                    name: function,
                    args,
                });
            }
            return Err(self.error("expected function name after ':'"));
        }

        if self.eat(&Token::LParen) {
            let args = self.arguments()?;
            return Ok(Expr::Call {
                namespace: None,
                name,
                args,
            });
        }

        Ok(Expr::Var(name))
    }

    /// Parse call arguments; the opening parenthesis is already consumed.
    fn arguments(&mut self) -> EngineResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.to_string()))
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expr("a + b * 2 == 7 && !done").unwrap();
        let expected = Expr::Binary(
            BinaryOp::And,
            Box::new(Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Binary(
                    BinaryOp::Add,
                    var("a"),
                    Box::new(Expr::Binary(
                        BinaryOp::Mul,
                        var("b"),
                        Box::new(Expr::Literal(Value::Int(2))),
                    )),
                )),
                Box::new(Expr::Literal(Value::Int(7))),
            )),
            Box::new(Expr::Unary(UnaryOp::Not, var("done"))),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_paths_and_calls() {
        let expr = parse_expr("@input.lines[0].sku").unwrap();
        assert!(expr.is_reference());

        let expr = parse_expr("math:max(1, x)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                namespace: Some("math".into()),
                name: "max".into(),
                args: vec![Expr::Literal(Value::Int(1)), Expr::Var("x".into())],
            }
        );
        assert!(!expr.is_reference());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_expr("").is_err());
        assert!(parse_expr("a +").is_err());
        assert!(parse_expr("f(1,").is_err());
        assert!(parse_expr("a b").is_err());
        assert!(parse_expr("@").is_err());
    }
}
