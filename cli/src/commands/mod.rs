// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the projector CLI

pub mod materialize;
pub mod render;
pub mod teardown;
pub mod validate;

pub use self::materialize::MaterializeArgs;
pub use self::render::RenderArgs;
pub use self::teardown::TeardownArgs;
pub use self::validate::ValidateArgs;

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use projector_core::application::VolumeProjector;
use projector_core::domain::errors::AggregateError;
use projector_core::domain::lookup::ObjectStore;
use projector_core::domain::node_config::ProjectorConfigManifest;
use projector_core::domain::projection::ProjectionRequest;
use projector_core::infrastructure::manifest_parser::ManifestParser;
use projector_core::infrastructure::ownership::FsGroupOwnership;
use projector_core::infrastructure::store::{FileObjectStore, StaticNodeAllocatable};

/// Wire the projector services from node configuration
pub(crate) fn build_projector(
    config: &ProjectorConfigManifest,
    store_override: Option<PathBuf>,
) -> Result<VolumeProjector> {
    let store: Option<Arc<dyn ObjectStore>> = match store_override.or_else(|| config.spec.store.path.clone()) {
        Some(path) => {
            let store: Arc<dyn ObjectStore> = Arc::new(
                FileObjectStore::load(&path)
                    .with_context(|| format!("Failed to open object store {:?}", path))?,
            );
            Some(store)
        }
        None => {
            warn!("No object store configured; secret and config sources cannot be resolved");
            None
        }
    };

    Ok(VolumeProjector::new(
        store,
        Arc::new(StaticNodeAllocatable::new(config.spec.node.allocatable.clone())),
        Arc::new(FsGroupOwnership),
    ))
}

/// Parse a manifest and complete it with node-level defaults
pub(crate) fn load_request(
    manifest: &Path,
    config: &ProjectorConfigManifest,
) -> Result<ProjectionRequest> {
    let manifest = ManifestParser::parse_file(manifest)?;
    let mut request = manifest.into_request(config.spec.volume.default_mode);

    if request.workload.spec.node_name.is_none() {
        request.workload.spec.node_name = config.spec.node.name.clone();
    }
    debug!(
        "Loaded volume {} for {} with {} sources",
        request.volume_name,
        request.identity(),
        request.sources.len()
    );
    Ok(request)
}

pub(crate) fn print_errors(errors: &AggregateError) {
    if errors.is_empty() {
        return;
    }
    eprintln!("{}", format!("{} source error(s):", errors.len()).yellow().bold());
    for error in errors.iter() {
        eprintln!("  {} {}", "•".yellow(), error);
    }
}
