/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tokenizer for the body of an interpolation.

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    At,
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

/// Split expression text into tokens.
pub fn tokenize(text: &str) -> EngineResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    let err = |message: String| EngineError::ExpressionParse {
        text: text.to_string(),
        message,
    };

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = pos;
            let mut is_float = false;
            while pos < chars.len() {
                let d = chars[pos];
                if d.is_ascii_digit() {
                    pos += 1;
                } else if d == '.'
                    && !is_float
                    && chars.get(pos + 1).is_some_and(|n| n.is_ascii_digit())
                {
                    is_float = true;
                    pos += 1;
                } else {
                    break;
                }
            }
            let literal: String = chars[start..pos].iter().collect();
            let token = if is_float {
                literal
                    .parse()
                    .map(Token::Float)
                    .map_err(|_| err(format!("invalid number '{}'", literal)))?
            } else {
                literal
                    .parse()
                    .map(Token::Int)
                    .map_err(|_| err(format!("invalid number '{}'", literal)))?
            };
            tokens.push(token);
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            pos += 1;
            let mut value = String::new();
            loop {
                match chars.get(pos) {
                    None => return Err(err("unterminated string literal".to_string())),
                    Some('\\') => {
                        match chars.get(pos + 1) {
                            Some('n') => value.push('\n'),
                            Some('t') => value.push('\t'),
                            Some(other) => value.push(*other),
                            None => return Err(err("unterminated string literal".to_string())),
                        }
                        pos += 2;
                    }
                    Some(ch) if *ch == quote => {
                        pos += 1;
                        break;
                    }
                    Some(ch) => {
                        value.push(*ch);
                        pos += 1;
                    }
                }
            }
            tokens.push(Token::Str(value));
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('@', _) => (Token::At, 1),
            ('.', _) => (Token::Dot, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            _ => return Err(err(format!("unexpected character '{}'", c))),
        };
        tokens.push(token);
        pos += width;
    }

    Ok(tokens)
}
