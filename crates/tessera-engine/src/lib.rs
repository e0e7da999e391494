/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Unit execution runtime for Tessera.
//!
//! Markup documents compile into trees of *units*: small typed nodes that
//! compute values, write into caller-owned maps, loop, include each other
//! and extend each other. This crate holds the whole runtime:
//!
//! - [`compile`]: markup nodes to unit trees, with attribute defaults and
//!   pluggable unit factories
//! - [`lifecycle`]: the fixed evaluation sequence every unit runs through
//! - [`extend`]: `extends` resolution (merge or replace, cached when
//!   context independent)
//! - [`unit`]: the built-in unit kinds, including the loop engine
//! - [`expr`]: the `${...}` expression language and its function registry
//! - [`registry`]: template loading and `file#id.id` lookup
//!
//! # Example
//!
//! ```rust
//! use tessera_engine::{Engine, MemoryLoader, Value};
//!
//! let engine = Engine::builder()
//!     .with_loader(MemoryLoader::new().with_template(
//!         "page.xml",
//!         r#"<loop id="digits" end="3"><text>${index}</text></loop>"#,
//!     ))
//!     .build();
//!
//! let mut rt = engine.runtime();
//! let value = engine.evaluate("page.xml#digits", &mut rt).unwrap();
//! assert_eq!(value, Value::from("0,1,2"));
//! ```

pub mod attributes;
pub mod compile;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod expr;
pub mod extend;
pub mod lifecycle;
pub mod registry;
pub mod serialize;
pub mod unit;
pub mod value;

// Re-export main types
pub use attributes::Attributes;
pub use compile::{Compiler, UnitRegistry};
pub use config::{EngineConfig, Settings};
pub use context::{ExternalContext, ExternalMap, RuntimeContext};
pub use engine::{Engine, EngineBuilder, Services};
pub use error::{EngineError, EngineResult};
pub use registry::{FileSystemLoader, MemoryLoader, Template, TemplateLoader, UnitPath};
pub use unit::{Shape, Unit, UnitKind, UnitNode};
pub use value::Value;
