/*
 * run.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Run command implementation
 */

//! Run command implementation.
//!
//! `tessera run page.xml` evaluates every top-level unit of the template;
//! `tessera run page.xml#body.title` evaluates one unit. Each non-null
//! value is printed on its own line, followed by the external context as
//! pretty JSON.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tessera_engine::{EngineConfig, ExternalContext, ExternalMap, Value};
use tracing::info;

/// Arguments for the run command
#[derive(Debug)]
pub struct RunArgs {
    /// `file.xml` or `file.xml#id.trail`
    pub target: String,
    /// JSON file with the initial external context
    pub context: Option<PathBuf>,
    /// `map.key=value` seeds
    pub set: Vec<String>,
    pub config: EngineConfig,
}

/// Execute the run command
pub fn execute(args: RunArgs) -> Result<()> {
    let (file, trail) = match args.target.split_once('#') {
        Some((file, trail)) => (file, Some(trail)),
        None => (args.target.as_str(), None),
    };
    let (engine, name) = super::engine_for(Path::new(file), args.config)?;

    let mut external = match &args.context {
        Some(path) => load_context(path)?,
        None => ExternalContext::new(),
    };
    for seed in &args.set {
        let (map, key, value) = parse_seed(seed)?;
        if !external.contains(&map) {
            external.insert_map(map.clone(), ExternalMap::new());
        }
        if let Some(entries) = external.get_mut(&map) {
            entries.insert(key, value);
        }
    }

    let mut rt = engine.runtime_with(external);
    let values = match trail {
        Some(trail) => {
            let target = format!("{}#{}", name, trail);
            info!(unit = %target, "Evaluating unit");
            vec![
                engine
                    .evaluate(&target, &mut rt)
                    .with_context(|| format!("Failed to evaluate {}", args.target))?,
            ]
        }
        None => {
            info!(template = %name, "Evaluating template");
            engine
                .run_template(&name, &mut rt)
                .with_context(|| format!("Failed to evaluate {}", args.target))?
        }
    };

    for value in values.iter().filter(|v| !v.is_null()) {
        println!("{}", value.to_text());
    }
    let external = rt.into_external();
    println!("{}", serde_json::to_string_pretty(&external.to_json())?);
    Ok(())
}

fn load_context(path: &Path) -> Result<ExternalContext> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Context file {} is not valid JSON", path.display()))?;
    ExternalContext::from_json(&json)
        .with_context(|| format!("Invalid context file {}", path.display()))
}

/// Split `map.key=value`. The value is parsed as JSON, falling back to a
/// plain string.
fn parse_seed(seed: &str) -> Result<(String, String, Value)> {
    let (path, raw) = seed
        .split_once('=')
        .with_context(|| format!("Expected MAP.KEY=VALUE, got '{}'", seed))?;
    let Some((map, key)) = path.split_once('.').filter(|(m, k)| !m.is_empty() && !k.is_empty())
    else {
        anyhow::bail!("Expected MAP.KEY=VALUE, got '{}'", seed);
    };
    let value = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(&json),
        Err(_) => Value::from(raw),
    };
    Ok((map.to_string(), key.to_string(), value))
}
