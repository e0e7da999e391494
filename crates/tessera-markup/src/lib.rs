//! Markup front end for Tessera.
//!
//! This crate turns XML text into a generic tree of [`Node`]s. It wraps
//! [`quick-xml`] and keeps only what the unit compiler needs from each node:
//! a local name, the namespace prefix and URI, the attributes, the ordered
//! children, and a node-kind discriminator (element, text, or other).
//!
//! # Overview
//!
//! The main types are:
//! - [`Document`]: The parsed document with its root element
//! - [`Element`]: An element with name, namespace, attributes and children
//! - [`Attribute`]: A name/value pair with its byte span
//! - [`Node`]: A child node (element, text, or comment)
//!
//! # Example
//!
//! ```rust
//! use tessera_markup::parse;
//!
//! let doc = parse(r#"<template>
//!   <block id="greeting">Hello</block>
//! </template>"#).unwrap();
//!
//! assert_eq!(doc.root.name, "template");
//!
//! let blocks = doc.root.get_children("block");
//! assert_eq!(blocks.len(), 1);
//! assert_eq!(blocks[0].get_attribute("id"), Some("greeting"));
//! ```
//!
//! Namespace declarations (`xmlns` and `xmlns:prefix`) are resolved while
//! parsing, so every element knows the URI its prefix is bound to.

pub mod error;
pub mod parser;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use parser::parse;
pub use types::{Attribute, Document, Element, Node, NodeKind, Span};
