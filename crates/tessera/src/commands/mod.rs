//! Command implementations for the Tessera CLI
//!
//! Each command module handles the CLI interface and delegates to
//! tessera-engine for the actual work.

pub mod check;
pub mod run;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tessera_engine::{Engine, EngineConfig, FileSystemLoader};
use tracing::debug;

/// Configuration file looked up in the working directory.
const DEFAULT_CONFIG: &str = "tessera.toml";

/// Load `--config`, or `./tessera.toml` when it exists, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG);
            if !fallback.exists() {
                debug!("No configuration file, using defaults");
                return Ok(EngineConfig::default());
            }
            fallback
        }
    };
    EngineConfig::from_file(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// An engine whose loader is rooted at the directory of `file`, and the
/// file name to load through it.
pub fn engine_for(file: &Path, config: EngineConfig) -> Result<(Engine, String)> {
    if !file.is_file() {
        anyhow::bail!("Template does not exist: {}", file.display());
    }
    let root = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid template path: {}", file.display()))?
        .to_string();
    debug!(root = %root.display(), template = %name, "Creating engine");

    let engine = Engine::builder()
        .with_config(config)
        .with_loader(FileSystemLoader::new(root))
        .build();
    Ok((engine, name))
}
