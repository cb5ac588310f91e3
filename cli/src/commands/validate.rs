// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Validate command: check a manifest and the node configuration

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use projector_core::domain::node_config::ProjectorConfigManifest;
use projector_core::infrastructure::manifest_parser::ManifestParser;
use projector_core::infrastructure::store::FileObjectStore;

#[derive(Args)]
pub struct ValidateArgs {
    /// ProjectedVolume manifest (only the configuration is checked when omitted)
    #[arg(value_name = "MANIFEST")]
    pub manifest: Option<PathBuf>,
}

pub async fn execute(args: ValidateArgs, config: &ProjectorConfigManifest) -> Result<()> {
    println!("Validating configuration...");
    config
        .validate()
        .context("Configuration validation failed")?;
    if let Some(path) = &config.spec.store.path {
        FileObjectStore::load(path)?;
    }
    println!("{}", "✓ Configuration is valid".green());

    if let Some(path) = args.manifest {
        let manifest = ManifestParser::parse_file(&path)?;
        let request = manifest.into_request(config.spec.volume.default_mode);
        request
            .validate_paths()
            .with_context(|| format!("Manifest {:?} declares conflicting paths", path))?;
        println!(
            "{} {} ({} sources)",
            "✓ Manifest is valid:".green(),
            request.volume_name.bold(),
            request.sources.len()
        );
    }

    Ok(())
}
