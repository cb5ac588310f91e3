// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Materialize command: resolve a manifest and publish it into a directory

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use projector_core::application::MaterializeError;
use projector_core::domain::node_config::ProjectorConfigManifest;
use projector_core::infrastructure::atomic_writer::WriteOutcome;

use super::{build_projector, load_request, print_errors};

#[derive(Args)]
pub struct MaterializeArgs {
    /// ProjectedVolume manifest
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Directory to publish into
    #[arg(short, long, value_name = "DIR")]
    pub target: PathBuf,

    /// Object store file (overrides spec.store.path)
    #[arg(long, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Supplemental group given read access (overrides spec.volume.fsGroup)
    #[arg(long, value_name = "GID")]
    pub fs_group: Option<u32>,

    /// Fail when any source could not be resolved
    #[arg(long)]
    pub strict: bool,
}

pub async fn execute(args: MaterializeArgs, config: &ProjectorConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    let request = load_request(&args.manifest, config)?;
    let projector = build_projector(config, args.store)?;
    let fs_group = args.fs_group.or(config.spec.volume.fs_group);

    info!(
        "Materializing volume {} into {:?}",
        request.volume_name, args.target
    );

    let report = match projector.materialize(&request, &args.target, fs_group).await {
        Ok(report) => report,
        Err(MaterializeError::Ownership { report, source }) => {
            eprintln!(
                "{}",
                format!("Data published ({:?}) but ownership failed: {}", report.outcome, source).red()
            );
            print_errors(&report.errors);
            anyhow::bail!("Failed to apply group ownership to {:?}", args.target);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to materialize volume {}", request.volume_name));
        }
    };

    match &report.outcome {
        WriteOutcome::Committed { data_dir, files } => println!(
            "{} {} ({} files, {} bytes) → {} [{}]",
            "✓ Published".green(),
            report.volume.bold(),
            files,
            report.bytes,
            report.target.display(),
            data_dir.dimmed()
        ),
        WriteOutcome::Unchanged => println!(
            "{} {} already up to date",
            "✓".green(),
            report.volume.bold()
        ),
    }

    print_errors(&report.errors);
    if args.strict && !report.is_complete() {
        anyhow::bail!("{} source error(s) while materializing {}", report.errors.len(), report.volume);
    }

    Ok(())
}
