// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Render command: dry run that prints the resolved payload

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use projector_core::domain::node_config::ProjectorConfigManifest;
use projector_core::domain::projection::Payload;

use super::{build_projector, load_request, print_errors};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct RenderArgs {
    /// ProjectedVolume manifest
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Object store file (overrides spec.store.path)
    #[arg(long, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Print file contents as well (text output only)
    #[arg(long)]
    pub show_data: bool,
}

#[derive(Debug, Serialize)]
struct RenderedFile<'a> {
    path: &'a str,
    mode: String,
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct RenderedVolume<'a> {
    volume: &'a str,
    files: Vec<RenderedFile<'a>>,
    errors: Vec<String>,
}

pub async fn execute(args: RenderArgs, config: &ProjectorConfigManifest) -> Result<()> {
    let request = load_request(&args.manifest, config)?;
    let projector = build_projector(config, args.store)?;

    let partial = projector
        .aggregator()
        .aggregate(&request)
        .await
        .with_context(|| format!("Failed to resolve volume {}", request.volume_name))?;

    match args.output {
        OutputFormat::Json => {
            let rendered = RenderedVolume {
                volume: &request.volume_name,
                files: rendered_files(&partial.value),
                errors: partial.errors.iter().map(|e| e.to_string()).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        OutputFormat::Text => {
            println!(
                "{} {} ({} files, {} bytes)",
                "Volume".bold(),
                request.volume_name.bold(),
                partial.value.len(),
                partial.value.total_bytes()
            );
            for (path, file) in partial.value.iter() {
                println!("  {:04o}  {:>8}  {}", file.mode, file.data.len(), path);
                if args.show_data {
                    let text = String::from_utf8_lossy(&file.data);
                    for line in text.lines() {
                        println!("          {}", line.dimmed());
                    }
                }
            }
            print_errors(&partial.errors);
        }
    }

    Ok(())
}

fn rendered_files(payload: &Payload) -> Vec<RenderedFile<'_>> {
    payload
        .iter()
        .map(|(path, file)| RenderedFile {
            path,
            mode: format!("{:04o}", file.mode),
            bytes: file.data.len(),
        })
        .collect()
}
