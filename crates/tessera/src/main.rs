//! Tessera CLI - Main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(version)]
#[command(about = "Compile and evaluate Tessera unit templates", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to ./tessera.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a template (file.xml) or one unit of it (file.xml#id.id)
    Run {
        /// Template file, optionally followed by #id.trail
        target: String,

        /// JSON file with the initial external context
        #[arg(long)]
        context: Option<PathBuf>,

        /// Seed an external map entry (MAP.KEY=VALUE, VALUE parsed as JSON when possible)
        #[arg(long = "set", value_name = "MAP.KEY=VALUE")]
        set: Vec<String>,
    },

    /// Compile a template, resolve its extensions and print the unit outline
    Check {
        /// Template file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match &cli.log_level {
        Some(level) => tracing_subscriber::EnvFilter::try_new(format!("tessera={}", level))?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "tessera=info".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            target,
            context,
            set,
        } => commands::run::execute(commands::run::RunArgs {
            target,
            context,
            set,
            config,
        }),
        Commands::Check { file } => {
            commands::check::execute(commands::check::CheckArgs { file, config })
        }
    }
}
