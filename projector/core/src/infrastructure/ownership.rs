// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Supplemental-group ownership for materialized trees.

use crate::domain::ownership::{OwnershipError, OwnershipManager};
use crate::domain::projection::PermissionMode;
use std::fs;
use std::os::unix::fs::{chown, PermissionsExt};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

const GROUP_READ: u32 = 0o040;
const GROUP_EXEC: u32 = 0o010;
const SET_GID: u32 = 0o2000;

/// Hands every file and directory under a tree to `fs_group`.
///
/// Files gain `g+r`; directories gain `g+rx` and setgid so entries created
/// later inherit the group. Symlinks are skipped, never followed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsGroupOwnership;

impl OwnershipManager for FsGroupOwnership {
    fn apply(&self, dir: &Path, fs_group: Option<u32>) -> Result<(), OwnershipError> {
        let Some(gid) = fs_group else {
            return Ok(());
        };

        let mut touched = 0usize;
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(|e| OwnershipError::Walk {
                path: e.path().unwrap_or(dir).to_path_buf(),
                reason: e.to_string(),
            })?;
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                continue;
            }

            let path = entry.path();
            chown(path, None, Some(gid)).map_err(|source| OwnershipError::Chown {
                path: path.to_path_buf(),
                gid,
                source,
            })?;

            let metadata = fs::symlink_metadata(path).map_err(|source| OwnershipError::Chmod {
                path: path.to_path_buf(),
                source,
            })?;
            let mut mode = metadata.permissions().mode() | GROUP_READ;
            if file_type.is_dir() {
                mode |= GROUP_EXEC | SET_GID;
            }
            fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
                OwnershipError::Chmod {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            touched += 1;
        }

        debug!("Applied group {} to {} entries under {:?}", gid, touched, dir);
        Ok(())
    }

    fn added_file_mode(&self) -> PermissionMode {
        GROUP_READ
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{symlink, MetadataExt};
    use tempfile::TempDir;

    fn current_gid(path: &Path) -> u32 {
        fs::metadata(path).unwrap().gid()
    }

    #[test]
    fn test_none_is_noop() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        fs::write(&file, "x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();

        FsGroupOwnership.apply(temp.path(), None).unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_adds_group_bits_and_skips_symlinks() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();
        let file = data.join("secret");
        fs::write(&file, "x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();
        symlink("data/secret", temp.path().join("link")).unwrap();

        // own group: permitted for any user
        let gid = current_gid(&file);
        FsGroupOwnership.apply(temp.path(), Some(gid)).unwrap();

        let file_mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o640);

        let dir_mode = fs::metadata(&data).unwrap().permissions().mode();
        assert_ne!(dir_mode & SET_GID, 0);
        assert_ne!(dir_mode & GROUP_EXEC, 0);
        assert!(fs::symlink_metadata(temp.path().join("link"))
            .unwrap()
            .file_type()
            .is_symlink());
    }
}
