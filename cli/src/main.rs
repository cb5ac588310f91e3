// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Projector CLI
//!
//! The `projector` binary materializes `ProjectedVolume` manifests on a node.
//!
//! ## Commands
//!
//! - `projector materialize <MANIFEST> --target <DIR>` - resolve and publish a volume
//! - `projector render <MANIFEST>` - dry run, print the resolved payload
//! - `projector validate [MANIFEST]` - check a manifest and the node configuration
//! - `projector teardown <DIR>` - remove a published volume

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use projector_core::domain::node_config::ProjectorConfigManifest;

mod commands;

use commands::{MaterializeArgs, RenderArgs, TeardownArgs, ValidateArgs};

/// Projector - materialize secrets, config and workload context into volumes
#[derive(Parser)]
#[command(name = "projector")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to node configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PROJECTOR_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true, env = "PROJECTOR_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve all sources and publish them atomically
    #[command(name = "materialize")]
    Materialize(MaterializeArgs),

    /// Resolve all sources and print the payload without writing it
    #[command(name = "render")]
    Render(RenderArgs),

    /// Validate a manifest and the node configuration
    #[command(name = "validate")]
    Validate(ValidateArgs),

    /// Remove a published volume
    #[command(name = "teardown")]
    Teardown(TeardownArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ProjectorConfigManifest::load_or_default(cli.config.clone())
        .context("Failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.spec.logging.level.clone());
    init_logging(&level, &config.spec.logging.format)?;

    match cli.command {
        Some(Commands::Materialize(args)) => commands::materialize::execute(args, &config).await,
        Some(Commands::Render(args)) => commands::render::execute(args, &config).await,
        Some(Commands::Validate(args)) => commands::validate::execute(args, &config).await,
        Some(Commands::Teardown(args)) => commands::teardown::execute(args).await,
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
