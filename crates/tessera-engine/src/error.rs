/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for compilation and evaluation.

use thiserror::Error;

/// Errors that can occur while compiling or evaluating units.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Expression text could not be parsed.
    #[error("Expression parse error in '{text}': {message}")]
    ExpressionParse { text: String, message: String },

    /// Expression evaluation failed (type error, bad operand, ...).
    #[error("Expression evaluation error in '{text}': {message}")]
    ExpressionEval { text: String, message: String },

    /// A function call named a function no namespace in the chain provides.
    #[error("Unknown function: {namespace}:{name}")]
    UnknownFunction { namespace: String, name: String },

    /// Writing into a named external map that does not exist.
    #[error("External context '{name}' does not exist")]
    MissingContext { name: String },

    /// An `assert` unit evaluated to false.
    #[error("Assertion failed [{id}]: {message}")]
    Assertion { id: String, message: String },

    /// The compiler met a tag with no registered unit factory.
    #[error("Unknown unit tag <{tag}>")]
    UnknownTag { tag: String },

    /// A required attribute is missing or has an unusable value.
    #[error("Invalid attribute '{attribute}' on <{tag}>: {message}")]
    InvalidAttribute {
        tag: String,
        attribute: String,
        message: String,
    },

    /// The template loader could not find a template.
    #[error("Template not found: {path}")]
    TemplateNotFound { path: String },

    /// An id trail did not lead to a unit.
    #[error("Unit '{trail}' not found in template {path}")]
    UnitNotFound { path: String, trail: String },

    /// Extension chains nested deeper than the configured limit.
    #[error("Extension chain too deep (depth > {max_depth}) while resolving {path}")]
    RecursiveExtension { path: String, max_depth: usize },

    /// A serializer name did not match any registered serializer.
    #[error("Unknown serializer: {name}")]
    UnknownSerializer { name: String },

    /// A serializer failed.
    #[error("Serializer '{name}' failed: {message}")]
    Serializer { name: String, message: String },

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid regular expression in a group-match transform.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Markup parse failure.
    #[error("Markup error in {path}: {source}")]
    Markup {
        path: String,
        #[source]
        source: tessera_markup::Error,
    },

    /// I/O error (e.g., reading a template file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for an evaluation error attributed to an expression.
    pub fn eval(text: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::ExpressionEval {
            text: text.into(),
            message: message.into(),
        }
    }

    /// True for failures raised by the expression language.
    pub fn is_expression_error(&self) -> bool {
        matches!(
            self,
            EngineError::ExpressionParse { .. }
                | EngineError::ExpressionEval { .. }
                | EngineError::UnknownFunction { .. }
        )
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
