// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume Ownership Contract
//!
//! Post-commit step that hands a materialized tree to a supplemental group so
//! that every process of the workload can read it regardless of its uid.
//! Runs after the atomic commit; a failure here is reported but never undoes
//! the published data.

use crate::domain::projection::PermissionMode;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub trait OwnershipManager: Send + Sync {
    /// Apply group ownership to everything under `dir`.
    ///
    /// `fs_group == None` means no group adjustment was requested.
    fn apply(&self, dir: &Path, fs_group: Option<u32>) -> Result<(), OwnershipError>;

    /// Mode bits `apply` may add to regular files
    fn added_file_mode(&self) -> PermissionMode {
        0
    }
}

/// Leaves ownership untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOwnership;

impl OwnershipManager for NoopOwnership {
    fn apply(&self, _dir: &Path, _fs_group: Option<u32>) -> Result<(), OwnershipError> {
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("failed to walk {path}: {reason}")]
    Walk { path: PathBuf, reason: String },

    #[error("failed to change group of {path} to {gid}: {source}")]
    Chown {
        path: PathBuf,
        gid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set permissions on {path}: {source}")]
    Chmod {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
