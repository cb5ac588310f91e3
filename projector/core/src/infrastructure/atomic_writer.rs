// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Atomic Writer
//!
//! Publishes a [`Payload`] into a target directory so that readers see
//! either the previous complete set of files or the new one, never a mix.
//!
//! ```text
//! <target>/..data                      -> ..2026_10_16_12_00_00.a1b2c3
//! <target>/..2026_10_16_12_00_00.a1b2c3/db/user
//! <target>/db                          -> ..data/db
//! ```
//!
//! Every write stages a fresh timestamped directory, then swaps the `..data`
//! symlink with a single `rename`. User-visible top-level entries are
//! symlinks through `..data`, so they follow the swap. A failure while
//! staging removes the staged directory and leaves `..data` untouched.
//!
//! The writer holds no state besides the target path. Concurrent writes to
//! one target must be serialized by the caller.

use crate::domain::path_sanitizer::{top_level, PathSanitizer, PathSanitizerError};
use crate::domain::projection::{FileProjection, Payload, PermissionMode};
use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Symlink pointing at the current data directory
pub const DATA_DIR_NAME: &str = "..data";

/// Transient link renamed over [`DATA_DIR_NAME`] during commit
pub const DATA_DIR_TMP_NAME: &str = "..data_tmp";

const DATA_DIR_MODE: PermissionMode = 0o755;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new data directory was published
    Committed { data_dir: String, files: usize },
    /// The target already held exactly this payload
    Unchanged,
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed { .. })
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("invalid payload path: {0}")]
    InvalidPath(#[from] PathSanitizerError),

    #[error("target directory {path} is unusable: {source}")]
    Target {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rolled back, previous contents kept: {context}: {source}")]
    RolledBack {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to publish new data directory: {source}")]
    Commit {
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AtomicWriter {
    target: PathBuf,
    log_context: String,
    tolerated_mode: PermissionMode,
}

impl AtomicWriter {
    /// `log_context` prefixes every log line (e.g. `volume creds for payments/api-0`)
    pub fn new(target: impl Into<PathBuf>, log_context: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            log_context: log_context.into(),
            tolerated_mode: 0,
        }
    }

    /// Ignore these mode bits when deciding whether the target is up to date.
    /// Used for bits a later ownership pass adds to published files.
    pub fn with_tolerated_mode(mut self, bits: PermissionMode) -> Self {
        self.tolerated_mode = bits;
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Publish `payload`, replacing whatever the target held before
    pub fn write(&self, payload: &Payload) -> Result<WriteOutcome, WriteError> {
        let sanitizer = PathSanitizer::new();
        for path in payload.paths() {
            sanitizer.validate(path)?;
        }

        fs::create_dir_all(&self.target).map_err(|source| self.target_error(source))?;

        let old_data_dir = self.current_data_dir()?;
        if let Some(old) = &old_data_dir {
            if self.holds_payload(old, payload) {
                debug!("{}: no update required for target directory", self.log_context);
                return Ok(WriteOutcome::Unchanged);
            }
        }

        // Staging: dropped (and removed) on every early return below
        let prefix = Utc::now().format("..%Y_%m_%d_%H_%M_%S.").to_string();
        let staging = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.target)
            .map_err(|source| WriteError::RolledBack {
                context: "creating staging directory".to_string(),
                source,
            })?;
        let staging_name = file_name(staging.path());

        fs::set_permissions(staging.path(), fs::Permissions::from_mode(DATA_DIR_MODE)).map_err(
            |source| WriteError::RolledBack {
                context: format!("setting permissions on {}", staging_name),
                source,
            },
        )?;

        for (path, file) in payload.iter() {
            write_file(staging.path(), path, file).map_err(|source| {
                warn!(
                    "{}: error writing {} to staging directory: {}",
                    self.log_context, path, source
                );
                WriteError::RolledBack {
                    context: format!("writing {}", path),
                    source,
                }
            })?;
        }
        debug!("{}: staged {} files in {}", self.log_context, payload.len(), staging_name);

        // Commit: one rename swaps readers over to the new directory
        let tmp_link = self.target.join(DATA_DIR_TMP_NAME);
        remove_if_exists(&tmp_link).map_err(|source| WriteError::Commit { source })?;
        symlink(&staging_name, &tmp_link).map_err(|source| WriteError::Commit { source })?;
        if let Err(source) = fs::rename(&tmp_link, self.target.join(DATA_DIR_NAME)) {
            let _ = fs::remove_file(&tmp_link);
            return Err(WriteError::Commit { source });
        }
        let _ = staging.keep();
        info!(
            "{}: published {} files in {}",
            self.log_context,
            payload.len(),
            staging_name
        );

        // Post-commit cleanup never undoes the swap
        let new_tops = top_levels(payload.paths());
        self.create_user_visible(&new_tops);
        if let Some(old) = old_data_dir {
            self.remove_stale_user_visible(&old, &new_tops);
            let old_path = self.target.join(&old);
            if let Err(e) = fs::remove_dir_all(&old_path) {
                warn!(
                    "{}: error removing old data directory {}: {}",
                    self.log_context, old, e
                );
            }
        }

        Ok(WriteOutcome::Committed {
            data_dir: staging_name,
            files: payload.len(),
        })
    }

    /// Read back the payload currently published, if any
    pub fn read_current(&self) -> Result<Option<Payload>, WriteError> {
        let Some(data_dir) = self.current_data_dir()? else {
            return Ok(None);
        };
        let root = self.target.join(&data_dir);

        let mut payload = Payload::new();
        for entry in walkdir::WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(|e| self.target_error(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&root)
                .map_err(|e| self.target_error(io::Error::new(io::ErrorKind::Other, e)))?;
            let data = fs::read(entry.path()).map_err(|source| self.target_error(source))?;
            let metadata = entry.metadata().map_err(|e| self.target_error(e.into()))?;
            payload.insert(
                relative.to_string_lossy().into_owned(),
                FileProjection::new(data, metadata.permissions().mode() & 0o7777),
            );
        }
        Ok(Some(payload))
    }

    /// Remove every entry this writer manages
    pub fn remove_all(&self) -> Result<(), WriteError> {
        let Some(data_dir) = self.current_data_dir()? else {
            debug!("{}: nothing published, nothing to remove", self.log_context);
            return Ok(());
        };

        let tops = self.listed_top_levels(&data_dir);
        for top in &tops {
            let link = self.target.join(top);
            if is_symlink(&link) {
                fs::remove_file(&link).map_err(|source| WriteError::Remove { path: link, source })?;
            }
        }

        for name in [DATA_DIR_NAME, DATA_DIR_TMP_NAME] {
            let link = self.target.join(name);
            remove_if_exists(&link).map_err(|source| WriteError::Remove { path: link, source })?;
        }

        let data_path = self.target.join(&data_dir);
        fs::remove_dir_all(&data_path).map_err(|source| WriteError::Remove {
            path: data_path,
            source,
        })?;

        info!("{}: removed {} published entries", self.log_context, tops.len());
        Ok(())
    }

    /// Name of the directory `..data` points to, `None` before the first write
    fn current_data_dir(&self) -> Result<Option<String>, WriteError> {
        match fs::read_link(self.target.join(DATA_DIR_NAME)) {
            Ok(dir) => Ok(Some(dir.to_string_lossy().into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.target_error(source)),
        }
    }

    /// Whether the published directory already matches `payload` exactly
    fn holds_payload(&self, data_dir: &str, payload: &Payload) -> bool {
        let current = match self.read_current() {
            Ok(Some(current)) => current,
            Ok(None) => return false,
            Err(e) => {
                warn!("{}: unable to read {}: {}", self.log_context, data_dir, e);
                return false;
            }
        };
        let keep = !self.tolerated_mode;
        let same = current.len() == payload.len()
            && payload.iter().all(|(path, want)| {
                current.get(path).is_some_and(|have| {
                    have.data == want.data && have.mode & keep == want.mode & keep
                })
            });
        if !same {
            return false;
        }
        // a deleted user-visible link also forces a rewrite
        top_levels(payload.paths())
            .iter()
            .all(|top| is_symlink(&self.target.join(top)))
    }

    fn create_user_visible(&self, tops: &BTreeSet<String>) {
        for top in tops {
            let link = self.target.join(top);
            if fs::symlink_metadata(&link).is_ok() {
                continue;
            }
            let points_to = Path::new(DATA_DIR_NAME).join(top);
            if let Err(e) = symlink(&points_to, &link) {
                warn!("{}: error creating link {}: {}", self.log_context, top, e);
            }
        }
    }

    fn remove_stale_user_visible(&self, old_data_dir: &str, keep: &BTreeSet<String>) {
        for top in self.listed_top_levels(old_data_dir) {
            if keep.contains(&top) {
                continue;
            }
            let link = self.target.join(&top);
            if !is_symlink(&link) {
                continue;
            }
            if let Err(e) = fs::remove_file(&link) {
                warn!("{}: error removing stale link {}: {}", self.log_context, top, e);
            }
        }
    }

    fn listed_top_levels(&self, data_dir: &str) -> BTreeSet<String> {
        match fs::read_dir(self.target.join(data_dir)) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(e) => {
                warn!("{}: unable to list {}: {}", self.log_context, data_dir, e);
                BTreeSet::new()
            }
        }
    }

    fn target_error(&self, source: io::Error) -> WriteError {
        WriteError::Target {
            path: self.target.clone(),
            source,
        }
    }
}

fn write_file(root: &Path, path: &str, file: &FileProjection) -> io::Result<()> {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&full, &file.data)?;
    fs::set_permissions(&full, fs::Permissions::from_mode(file.mode))
}

fn top_levels<'a>(paths: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    paths.map(|p| top_level(p).to_string()).collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
