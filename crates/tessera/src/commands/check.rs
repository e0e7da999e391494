/*
 * check.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Check command implementation
 */

//! Check command implementation.
//!
//! Compiles a template, resolves its extensions against an empty runtime
//! context and prints the outline of every resolved top-level unit.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tessera_engine::{EngineConfig, Shape};
use tracing::info;

/// Arguments for the check command
#[derive(Debug)]
pub struct CheckArgs {
    pub file: PathBuf,
    pub config: EngineConfig,
}

/// Execute the check command
pub fn execute(args: CheckArgs) -> Result<()> {
    let (engine, name) = super::engine_for(&args.file, args.config)?;
    let template = engine
        .load(&name)
        .with_context(|| format!("Failed to compile {}", args.file.display()))?;
    let rt = engine.runtime();
    let units = template
        .resolve_units(&rt)
        .with_context(|| format!("Failed to resolve extensions in {}", args.file.display()))?;

    info!(
        template = %name,
        units = units.len(),
        context_free = template.is_resolved(),
        "Template checked"
    );
    for unit in &units {
        print!("{}", Shape::of(unit.as_ref()).outline());
    }
    Ok(())
}
