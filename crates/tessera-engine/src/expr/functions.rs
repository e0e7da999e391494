/*
 * functions.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Function registry for the expression language.
//!
//! Functions live in namespaces. Each namespace may declare parent
//! namespaces, and every lookup chain ends at the root namespace `core`:
//!
//! ```text
//! resolve("str", "upper")  ->  str?  ->  core  ->  found
//! ```
//!
//! Built-in functions never fail on malformed numeric or format input;
//! they return [`Value::Null`] instead.

use super::eval::EvalContext;
use crate::error::EngineResult;
use crate::value::{Sequence, Value};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A callable registered in a namespace.
pub type Function = Arc<dyn Fn(&[Value], &EvalContext<'_>) -> EngineResult<Value> + Send + Sync>;

#[derive(Default)]
struct Namespace {
    parents: Vec<String>,
    functions: HashMap<String, Function>,
}

/// Namespaced functions with parent-chain fallback.
pub struct FunctionRegistry {
    namespaces: HashMap<String, Namespace>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.namespaces.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("namespaces", &names)
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// The root namespace every lookup chain ends at.
    pub const ROOT: &'static str = "core";

    /// A registry holding only an empty root namespace.
    pub fn empty() -> Self {
        let mut namespaces = HashMap::new();
        namespaces.insert(Self::ROOT.to_string(), Namespace::default());
        Self { namespaces }
    }

    /// A registry with the built-in `core`, `str` and `math` functions.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        register_core(&mut registry);
        register_str(&mut registry);
        register_math(&mut registry);
        registry
    }

    /// Declare a namespace (or update its parents).
    pub fn register_namespace(&mut self, name: &str, parents: &[&str]) {
        let ns = self.namespaces.entry(name.to_string()).or_default();
        ns.parents = parents.iter().map(|p| p.to_string()).collect();
    }

    /// Register a function, creating the namespace if it does not exist.
    pub fn register<F>(&mut self, namespace: &str, name: &str, function: F)
    where
        F: Fn(&[Value], &EvalContext<'_>) -> EngineResult<Value> + Send + Sync + 'static,
    {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .functions
            .insert(name.to_string(), Arc::new(function));
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    /// Find a function: the namespace itself, its parents depth-first in
    /// declaration order, then the root.
    pub fn resolve(&self, namespace: &str, name: &str) -> Option<&Function> {
        let mut visited = HashSet::new();
        self.search(namespace, name, &mut visited).or_else(|| {
            self.namespaces
                .get(Self::ROOT)
                .and_then(|ns| ns.functions.get(name))
        })
    }

    fn search(
        &self,
        namespace: &str,
        name: &str,
        visited: &mut HashSet<String>,
    ) -> Option<&Function> {
        if !visited.insert(namespace.to_string()) {
            return None;
        }
        let ns = self.namespaces.get(namespace)?;
        if let Some(function) = ns.functions.get(name) {
            return Some(function);
        }
        ns.parents
            .iter()
            .find_map(|parent| self.search(parent, name, visited))
    }
}

fn arg(args: &[Value], index: usize) -> &Value {
    static NULL: Value = Value::Null;
    args.get(index).unwrap_or(&NULL)
}

fn text(args: &[Value], index: usize) -> String {
    arg(args, index).to_text()
}

/// Items of a collection argument; scalars become a single item.
fn items(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::List(items) => items.clone(),
        Value::Seq(seq) => seq.iter().collect(),
        Value::Map(map) => map.values().cloned().collect(),
        other => vec![other.clone()],
    }
}

pub(crate) static PATTERNS: Lazy<Mutex<HashMap<String, Regex>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Compile a pattern once per process.
pub(crate) fn cached_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut cache = PATTERNS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

fn register_core(registry: &mut FunctionRegistry) {
    let core = FunctionRegistry::ROOT;

    registry.register(core, "len", |args, _| {
        Ok(Value::Int(match arg(args, 0) {
            Value::Null => 0,
            Value::String(s) => s.chars().count() as i64,
            Value::List(items) => items.len() as i64,
            Value::Seq(seq) => seq.iter().count() as i64,
            Value::Map(map) => map.len() as i64,
            other => other.to_text().chars().count() as i64,
        }))
    });
    registry.register(core, "upper", |args, _| {
        Ok(Value::String(text(args, 0).to_uppercase()))
    });
    registry.register(core, "lower", |args, _| {
        Ok(Value::String(text(args, 0).to_lowercase()))
    });
    registry.register(core, "trim", |args, _| {
        Ok(Value::String(text(args, 0).trim().to_string()))
    });
    registry.register(core, "concat", |args, _| {
        Ok(Value::String(args.iter().map(Value::to_text).collect()))
    });
    registry.register(core, "join", |args, _| {
        let separator = match arg(args, 1) {
            Value::Null => ",".to_string(),
            sep => sep.to_text(),
        };
        let parts: Vec<String> = items(arg(args, 0)).iter().map(Value::to_text).collect();
        Ok(Value::String(parts.join(&separator)))
    });
    registry.register(core, "split", |args, _| {
        let source = text(args, 0);
        let separator = match arg(args, 1) {
            Value::Null => ",".to_string(),
            sep => sep.to_text(),
        };
        if source.is_empty() {
            return Ok(Value::List(Vec::new()));
        }
        Ok(Value::List(
            source.split(separator.as_str()).map(Value::from).collect(),
        ))
    });
    registry.register(core, "replace", |args, _| {
        Ok(Value::String(
            text(args, 0).replace(&text(args, 1), &text(args, 2)),
        ))
    });
    registry.register(core, "substring", |args, _| {
        let source: Vec<char> = text(args, 0).chars().collect();
        let Some(start) = arg(args, 1).as_i64() else {
            return Ok(Value::Null);
        };
        let end = match arg(args, 2) {
            Value::Null => source.len() as i64,
            v => match v.as_i64() {
                Some(end) => end,
                None => return Ok(Value::Null),
            },
        };
        let clamp = |i: i64| i.clamp(0, source.len() as i64) as usize;
        let (start, end) = (clamp(start), clamp(end));
        if start >= end {
            return Ok(Value::String(String::new()));
        }
        Ok(Value::String(source[start..end].iter().collect()))
    });
    registry.register(core, "contains", |args, _| {
        let needle = arg(args, 1);
        Ok(Value::Bool(match arg(args, 0) {
            Value::Null => false,
            Value::String(s) => s.contains(&needle.to_text()),
            Value::Map(map) => map.contains_key(&needle.to_text()),
            collection => items(collection).contains(needle),
        }))
    });
    registry.register(core, "keys", |args, _| {
        let keys = match arg(args, 0) {
            Value::Map(map) => map.keys().map(|k| Value::from(k.as_str())).collect(),
            Value::List(items) => (0..items.len() as i64).map(Value::Int).collect(),
            _ => Vec::new(),
        };
        Ok(Value::Seq(Sequence::from_values(keys)))
    });
    registry.register(core, "values", |args, _| Ok(Value::List(items(arg(args, 0)))));
    registry.register(core, "int", |args, _| {
        let value = arg(args, 0);
        Ok(value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
            .map(Value::Int)
            .unwrap_or_default())
    });
    registry.register(core, "float", |args, _| {
        Ok(arg(args, 0).as_f64().map(Value::Float).unwrap_or_default())
    });
    registry.register(core, "coalesce", |args, _| {
        Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or_default())
    });
    registry.register(core, "range", |args, _| {
        let numbers: Option<Vec<i64>> = args.iter().map(Value::as_i64).collect();
        let Some(numbers) = numbers else {
            return Ok(Value::Null);
        };
        let seq = match numbers.as_slice() {
            [end] => Sequence::range(0, *end, 1),
            [start, end] => {
                let step = if end < start { -1 } else { 1 };
                Sequence::range(*start, *end, step)
            }
            [start, end, step] => Sequence::range(*start, *end, *step),
            _ => return Ok(Value::Null),
        };
        Ok(Value::Seq(seq))
    });
    registry.register(core, "json", |args, _| {
        Ok(Value::String(arg(args, 0).to_json().to_string()))
    });
    registry.register(core, "scope", |_, ctx| {
        Ok(Value::Map(ctx.runtime.scope().cloned().unwrap_or_else(IndexMap::new)))
    });
    registry.register(core, "empty", |args, _| {
        Ok(Value::Bool(match arg(args, 0) {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Seq(seq) => seq.iter().next().is_none(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        }))
    });
    registry.register(core, "matches", |args, _| {
        Ok(match cached_regex(&text(args, 1)).ok() {
            Some(re) => Value::Bool(re.is_match(&text(args, 0))),
            None => Value::Null,
        })
    });
}

fn register_str(registry: &mut FunctionRegistry) {
    registry.register_namespace("str", &[FunctionRegistry::ROOT]);

    // pad(text, width, fill = " ") pads on the left.
    registry.register("str", "pad", |args, _| {
        let source = text(args, 0);
        let Some(width) = arg(args, 1).as_i64() else {
            return Ok(Value::Null);
        };
        let fill = match arg(args, 2) {
            Value::Null => ' ',
            v => v.to_text().chars().next().unwrap_or(' '),
        };
        let missing = (width.max(0) as usize).saturating_sub(source.chars().count());
        let mut padded: String = std::iter::repeat_n(fill, missing).collect();
        padded.push_str(&source);
        Ok(Value::String(padded))
    });
    registry.register("str", "repeat", |args, _| {
        match arg(args, 1).as_i64() {
            Some(n) if n >= 0 => Ok(Value::String(text(args, 0).repeat(n as usize))),
            _ => Ok(Value::Null),
        }
    });
}

fn register_math(registry: &mut FunctionRegistry) {
    registry.register_namespace("math", &[FunctionRegistry::ROOT]);

    fn numbers(args: &[Value]) -> Option<Vec<Value>> {
        let flat: Vec<Value> = if args.len() == 1 {
            items(&args[0])
        } else {
            args.to_vec()
        };
        if flat.is_empty() || flat.iter().any(|v| v.as_f64().is_none()) {
            return None;
        }
        Some(flat)
    }

    fn pick(args: &[Value], want: std::cmp::Ordering) -> Value {
        let Some(values) = numbers(args) else {
            return Value::Null;
        };
        let mut best = values[0].clone();
        for v in &values[1..] {
            let (a, b) = (v.as_f64().unwrap_or_default(), best.as_f64().unwrap_or_default());
            if a.partial_cmp(&b) == Some(want) {
                best = v.clone();
            }
        }
        best
    }

    registry.register("math", "min", |args, _| Ok(pick(args, std::cmp::Ordering::Less)));
    registry.register("math", "max", |args, _| {
        Ok(pick(args, std::cmp::Ordering::Greater))
    });
    registry.register("math", "abs", |args, _| {
        Ok(match arg(args, 0) {
            Value::Int(i) => Value::Int(i.abs()),
            other => other.as_f64().map(|f| Value::Float(f.abs())).unwrap_or_default(),
        })
    });
    registry.register("math", "round", |args, _| {
        let Some(value) = arg(args, 0).as_f64() else {
            return Ok(Value::Null);
        };
        let digits = arg(args, 1).as_i64().unwrap_or(0).clamp(0, 15) as i32;
        if digits == 0 {
            return Ok(Value::Int(value.round() as i64));
        }
        let factor = 10f64.powi(digits);
        Ok(Value::Float((value * factor).round() / factor))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn call(ns: &str, name: &str, args: &[Value]) -> Value {
        let engine = Engine::builder().build();
        let rt = engine.runtime();
        let ctx = EvalContext::new(&rt);
        let function = rt
            .services()
            .functions
            .resolve(ns, name)
            .expect("function should resolve");
        function(args, &ctx).unwrap()
    }

    #[test]
    fn test_resolution_chain() {
        let mut registry = FunctionRegistry::new();
        registry.register_namespace("report", &["str"]);
        registry.register("report", "title", |_, _| Ok(Value::from("T")));

        assert!(registry.resolve("report", "title").is_some());
        // Parent namespace.
        assert!(registry.resolve("report", "pad").is_some());
        // Root fallback.
        assert!(registry.resolve("report", "upper").is_some());
        // Unknown namespaces still fall back to the root.
        assert!(registry.resolve("nowhere", "len").is_some());
        assert!(registry.resolve("core", "pad").is_none());
        assert!(registry.resolve("report", "missing").is_none());
    }

    #[test]
    fn test_cyclic_parents_terminate() {
        let mut registry = FunctionRegistry::new();
        registry.register_namespace("a", &["b"]);
        registry.register_namespace("b", &["a"]);
        assert!(registry.resolve("a", "nothing").is_none());
        assert!(registry.resolve("a", "len").is_some());
    }

    #[test]
    fn test_local_shadows_root() {
        let mut registry = FunctionRegistry::new();
        registry.register("custom", "len", |_, _| Ok(Value::Int(-1)));
        assert!(registry.resolve("custom", "len").is_some());
        assert!(!Arc::ptr_eq(
            registry.resolve("custom", "len").unwrap(),
            registry.resolve("core", "len").unwrap()
        ));
    }

    #[test]
    fn test_string_builtins() {
        assert_eq!(call("core", "upper", &["ab".into()]), Value::from("AB"));
        assert_eq!(
            call("core", "split", &["a;b".into(), ";".into()]),
            Value::List(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            call("core", "substring", &["hello".into(), Value::Int(1), Value::Int(3)]),
            Value::from("el")
        );
        assert_eq!(
            call("str", "pad", &["7".into(), Value::Int(3), "0".into()]),
            Value::from("007")
        );
        assert_eq!(call("str", "repeat", &["ab".into(), Value::Int(2)]), Value::from("abab"));
    }

    #[test]
    fn test_parse_failures_return_null() {
        assert_eq!(call("core", "int", &["abc".into()]), Value::Null);
        assert_eq!(call("core", "int", &["3.9".into()]), Value::Int(3));
        assert_eq!(call("core", "float", &["x".into()]), Value::Null);
        assert_eq!(
            call("core", "substring", &["hello".into(), "x".into()]),
            Value::Null
        );
        assert_eq!(call("core", "matches", &["a".into(), "(".into()]), Value::Null);
        assert_eq!(call("math", "max", &["a".into(), Value::Int(1)]), Value::Null);
    }

    #[test]
    fn test_collections() {
        let list = Value::List(vec![Value::Int(3), Value::Int(9), Value::Int(4)]);
        assert_eq!(call("math", "max", &[list.clone()]), Value::Int(9));
        assert_eq!(call("math", "min", &[Value::Int(2), Value::Float(1.5)]), Value::Float(1.5));
        assert_eq!(call("core", "len", &[list.clone()]), Value::Int(3));
        assert_eq!(call("core", "join", &[list, "-".into()]), Value::from("3-9-4"));
        assert_eq!(
            call("core", "range", &[Value::Int(3), Value::Int(0)]),
            Value::Seq(Sequence::range(3, 0, -1))
        );
        assert_eq!(call("math", "round", &[Value::Float(2.346), Value::Int(2)]), Value::Float(2.35));
    }
}
