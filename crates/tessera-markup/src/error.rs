//! Error types for markup parsing.

use crate::types::Span;
use thiserror::Error;

/// Result type alias for tessera-markup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during markup parsing.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// XML syntax error from quick-xml.
    #[error("XML syntax error: {message}")]
    XmlSyntax {
        message: String,
        /// Byte offset where the error occurred.
        position: Option<u64>,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEof {
        /// What was expected when EOF was encountered.
        expected: String,
        span: Option<Span>,
    },

    /// Mismatched end tag.
    #[error("Mismatched end tag: expected </{expected}>, found </{found}>")]
    MismatchedEndTag {
        expected: String,
        found: String,
        span: Option<Span>,
    },

    /// Invalid document structure.
    #[error("Invalid markup structure: {message}")]
    InvalidStructure { message: String, span: Option<Span> },

    /// A prefix was used without a matching `xmlns:prefix` declaration.
    #[error("Undeclared namespace prefix '{prefix}'")]
    UndeclaredPrefix { prefix: String, span: Option<Span> },

    /// Empty document (no root element).
    #[error("Empty markup document: no root element found")]
    EmptyDocument,

    /// Multiple root elements.
    #[error("Invalid markup: multiple root elements")]
    MultipleRoots { span: Option<Span> },
}

impl Error {
    /// Byte span of the offending construct, when known.
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::XmlSyntax { position, .. } => position.map(|p| Span::new(p as usize, p as usize)),
            Error::UnexpectedEof { span, .. }
            | Error::MismatchedEndTag { span, .. }
            | Error::InvalidStructure { span, .. }
            | Error::UndeclaredPrefix { span, .. }
            | Error::MultipleRoots { span } => *span,
            Error::EmptyDocument => None,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlSyntax {
            message: err.to_string(),
            position: None,
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlSyntax {
            message: format!("Attribute error: {}", err),
            position: None,
        }
    }
}
