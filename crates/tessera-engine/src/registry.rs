/*
 * registry.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled templates, keyed by path.
//!
//! A [`TemplateRegistry`] reads template sources through a
//! [`TemplateLoader`], compiles them once and hands out shared
//! [`Template`]s. Units inside a template are addressed with
//! `file#id.id.id`; a bare `#id.id` refers to the template of the unit
//! that names it.

use crate::compile::Compiler;
use crate::context::RuntimeContext;
use crate::engine::Services;
use crate::error::{EngineError, EngineResult};
use crate::extend;
use crate::unit::Unit;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Reads template sources by path.
pub trait TemplateLoader: fmt::Debug + Send + Sync {
    fn read(&self, path: &str) -> EngineResult<String>;
}

/// Loads templates from files below a root directory.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TemplateLoader for FileSystemLoader {
    fn read(&self, path: &str) -> EngineResult<String> {
        let full = self.root.join(path);
        match std::fs::read_to_string(&full) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::TemplateNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Serves template sources held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(path.into(), source.into());
    }
}

impl TemplateLoader for MemoryLoader {
    fn read(&self, path: &str) -> EngineResult<String> {
        self.sources
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::TemplateNotFound {
                path: path.to_string(),
            })
    }
}

/// A parsed `file#id.id` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPath {
    /// `None` for `#id` references to the current template.
    pub file: Option<String>,
    pub trail: Vec<String>,
}

impl UnitPath {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (file, trail) = match text.split_once('#') {
            Some((file, trail)) => (file, trail),
            None => (text, ""),
        };
        Self {
            file: (!file.is_empty()).then(|| file.to_string()),
            trail: trail
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// The file part, or `origin` for same-template references.
    pub fn file_or<'a>(&'a self, origin: Option<&'a str>) -> Option<&'a str> {
        self.file.as_deref().or(origin)
    }
}

/// The compiled top-level units of one template.
pub struct Template {
    path: Arc<str>,
    units: Vec<Arc<dyn Unit>>,
    resolved: OnceLock<Vec<Arc<dyn Unit>>>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("path", &self.path)
            .field("units", &self.units.len())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl Template {
    pub fn new(path: &str, units: Vec<Arc<dyn Unit>>) -> Self {
        Self {
            path: Arc::from(path),
            units,
            resolved: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn units(&self) -> &[Arc<dyn Unit>] {
        &self.units
    }

    /// Walk top-level units, then children, by raw identifier.
    pub fn find_by_id_trail<S: AsRef<str>>(&self, trail: &[S]) -> Option<&Arc<dyn Unit>> {
        let (first, rest) = trail.split_first()?;
        let mut current = self
            .units
            .iter()
            .find(|u| u.id_or_else() == Some(first.as_ref()))?;
        for id in rest {
            current = current.node().child(id.as_ref())?;
        }
        Some(current)
    }

    /// True once every top-level unit resolved path-independently.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Apply extension resolution to every top-level unit.
    ///
    /// The resolved list is kept when every unit was cacheable, which makes
    /// later calls return it without work.
    pub fn resolve_units(&self, rt: &RuntimeContext) -> EngineResult<Vec<Arc<dyn Unit>>> {
        if let Some(units) = self.resolved.get() {
            return Ok(units.clone());
        }
        let mut units = Vec::with_capacity(self.units.len());
        let mut cacheable = true;
        for unit in &self.units {
            let resolved = extend::resolve(unit, rt)?;
            cacheable &= resolved.cacheable;
            units.push(resolved.unit);
        }
        if cacheable {
            tracing::debug!(template = %self.path, "Template fully resolved");
            let _ = self.resolved.set(units.clone());
        }
        Ok(units)
    }
}

/// Arena of compiled templates keyed by path.
#[derive(Debug)]
pub struct TemplateRegistry {
    loader: Box<dyn TemplateLoader>,
    templates: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateRegistry {
    pub fn new(loader: impl TemplateLoader + 'static) -> Self {
        Self::with_boxed_loader(Box::new(loader))
    }

    pub fn with_boxed_loader(loader: Box<dyn TemplateLoader>) -> Self {
        Self {
            loader,
            templates: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, path: &str) -> Option<Arc<Template>> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Add a compiled template, replacing any entry with the same path.
    pub fn insert(&self, template: Template) -> Arc<Template> {
        let template = Arc::new(template);
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(template.path().to_string(), Arc::clone(&template));
        template
    }

    /// The template at `path`, compiled on first use.
    pub fn load(&self, path: &str, services: &Services) -> EngineResult<Arc<Template>> {
        if let Some(template) = self.get(path) {
            return Ok(template);
        }
        tracing::debug!(path, "Loading template");
        let source = self.loader.read(path)?;
        let units = Compiler::new(services).with_origin(path).compile_str(&source)?;
        let template = Arc::new(Template::new(path, units));

        // First writer wins if two threads compiled the same path.
        let mut templates = self
            .templates
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            templates.entry(path.to_string()).or_insert(template),
        ))
    }

    /// Locate the unit a `file#id.id` path points at.
    ///
    /// Without an id trail the unit with the raw id `same_id` is used,
    /// falling back to the only unit of a single-unit template.
    pub fn find_unit(
        &self,
        path: &str,
        origin: Option<&str>,
        same_id: Option<&str>,
        services: &Services,
    ) -> EngineResult<Arc<dyn Unit>> {
        let target = UnitPath::parse(path);
        let file = target
            .file_or(origin)
            .ok_or_else(|| EngineError::TemplateNotFound {
                path: path.to_string(),
            })?;
        let template = self.load(file, services)?;

        let found = if target.trail.is_empty() {
            same_id
                .and_then(|id| template.find_by_id_trail(&[id]))
                .or_else(|| match template.units() {
                    [only] => Some(only),
                    _ => None,
                })
        } else {
            template.find_by_id_trail(target.trail.as_slice())
        };
        found.cloned().ok_or_else(|| EngineError::UnitNotFound {
            path: file.to_string(),
            trail: if target.trail.is_empty() {
                same_id.unwrap_or_default().to_string()
            } else {
                target.trail.join(".")
            },
        })
    }

    /// Like [`find_unit`](Self::find_unit), but the trail is walked on the
    /// resolved tree so children inherited through `extends` are reachable.
    /// The returned unit is already resolved.
    pub fn resolve_unit(
        &self,
        path: &str,
        origin: Option<&str>,
        rt: &RuntimeContext,
    ) -> EngineResult<Arc<dyn Unit>> {
        let services = rt.services();
        let target = UnitPath::parse(path);
        let Some((first, rest)) = target.trail.split_first() else {
            let unit = self.find_unit(path, origin, None, services)?;
            return Ok(extend::resolve(&unit, rt)?.unit);
        };
        let file = target
            .file_or(origin)
            .ok_or_else(|| EngineError::TemplateNotFound {
                path: path.to_string(),
            })?;
        let not_found = || EngineError::UnitNotFound {
            path: file.to_string(),
            trail: target.trail.join("."),
        };

        let template = self.load(file, services)?;
        let head = template.find_by_id_trail(&[first]).ok_or_else(not_found)?;
        let mut current = extend::resolve(head, rt)?.unit;
        for id in rest {
            let child = current.node().child(id).cloned().ok_or_else(not_found)?;
            current = child;
        }
        Ok(current)
    }
}
