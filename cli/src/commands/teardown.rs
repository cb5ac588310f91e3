// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Teardown command: remove a published volume

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use projector_core::application::VolumeProjector;
use projector_core::domain::ownership::NoopOwnership;
use projector_core::infrastructure::store::StaticNodeAllocatable;

#[derive(Args)]
pub struct TeardownArgs {
    /// Directory the volume was published into
    #[arg(value_name = "DIR")]
    pub target: PathBuf,

    /// Volume name used in log lines
    #[arg(long, default_value = "volume")]
    pub name: String,
}

pub async fn execute(args: TeardownArgs) -> Result<()> {
    // teardown never resolves sources
    let projector = VolumeProjector::new(
        None,
        Arc::new(StaticNodeAllocatable::default()),
        Arc::new(NoopOwnership),
    );

    projector
        .tear_down(&args.name, &args.target)
        .await
        .with_context(|| format!("Failed to tear down {:?}", args.target))?;

    println!("{} {}", "✓ Removed".green(), args.target.display());
    Ok(())
}
