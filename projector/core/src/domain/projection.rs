// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Projection Model
//!
//! Value objects describing what feeds a projected volume and what it
//! resolves to:
//!
//! - [`ProjectionRequest`] - ordered sources, default mode and the owning workload
//! - [`SourceSpec`] - closed set of source kinds (secret, config, context field)
//! - [`FileProjection`] / [`Payload`] - the resolved `path → bytes + mode` mapping
//!
//! Requests are built once per materialization and never mutated afterwards.

use crate::domain::errors::ProjectionError;
use crate::domain::field_path::ResourceFieldSelector;
use crate::domain::path_sanitizer::clean;
use crate::domain::workload::{Workload, WorkloadIdentity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// POSIX permission bits of a projected file
pub type PermissionMode = u32;

/// Mode applied when a request does not override it
pub const DEFAULT_MODE: PermissionMode = 0o644;

// ============================================================================
// Request
// ============================================================================

/// Everything needed to materialize one projected volume
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRequest {
    pub volume_name: String,
    pub sources: Vec<SourceSpec>,
    pub default_mode: Option<PermissionMode>,
    pub workload: Workload,
}

impl ProjectionRequest {
    pub fn new(volume_name: impl Into<String>, workload: Workload) -> Self {
        Self {
            volume_name: volume_name.into(),
            sources: Vec::new(),
            default_mode: Some(DEFAULT_MODE),
            workload,
        }
    }

    pub fn with_source(mut self, source: SourceSpec) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_default_mode(mut self, mode: Option<PermissionMode>) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn identity(&self) -> WorkloadIdentity {
        self.workload.identity()
    }

    /// Reject requests in which two explicitly declared paths land on the
    /// same cleaned output path.
    ///
    /// Only user-written paths are checked here; raw object keys are not
    /// known until resolution and are disambiguated by the aggregator.
    pub fn validate_paths(&self) -> Result<(), ProjectionError> {
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (index, source) in self.sources.iter().enumerate() {
            for path in source.explicit_paths() {
                let cleaned = clean(path);
                if let Some(first) = seen.insert(cleaned.clone(), index) {
                    return Err(ProjectionError::ConflictingPaths {
                        path: cleaned,
                        first,
                        second: index,
                    });
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Sources
// ============================================================================

/// One declared origin of data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceSpec {
    Secret(SecretProjection),
    Config(ConfigProjection),
    ContextField(ContextFieldProjection),
}

impl SourceSpec {
    /// Short human-readable description for logs (`secret db-credentials`)
    pub fn describe(&self) -> String {
        match self {
            SourceSpec::Secret(s) => format!("secret {}", s.name),
            SourceSpec::Config(c) => format!("config {}", c.name),
            SourceSpec::ContextField(f) => format!("context fields ({} items)", f.items.len()),
        }
    }

    /// Paths written by the user, before cleaning
    pub fn explicit_paths(&self) -> Vec<&str> {
        match self {
            SourceSpec::Secret(SecretProjection { items, .. })
            | SourceSpec::Config(ConfigProjection { items, .. }) => {
                items.iter().map(|i| i.path.as_str()).collect()
            }
            SourceSpec::ContextField(f) => f.items.iter().map(|i| i.path.as_str()).collect(),
        }
    }
}

/// Maps one key of a key/value object to an output path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyToPath {
    pub key: String,
    pub path: String,

    #[serde(default, with = "octal_mode", skip_serializing_if = "Option::is_none")]
    pub mode: Option<PermissionMode>,
}

impl KeyToPath {
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            mode: None,
        }
    }
}

/// Project keys of a named secret. No items means every key, named by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretProjection {
    pub name: String,

    #[serde(default)]
    pub items: Vec<KeyToPath>,
}

/// Project keys of a named configuration object. No items means every key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigProjection {
    pub name: String,

    #[serde(default)]
    pub items: Vec<KeyToPath>,
}

/// Project fields of the owning workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFieldProjection {
    #[serde(default)]
    pub items: Vec<ContextFieldFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFieldFile {
    pub path: String,

    #[serde(flatten)]
    pub selector: FieldSelector,

    #[serde(default, with = "octal_mode", skip_serializing_if = "Option::is_none")]
    pub mode: Option<PermissionMode>,
}

/// Which workload value a context-field file holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldSelector {
    FieldRef(ObjectFieldSelector),
    ResourceFieldRef(ResourceFieldSelector),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectFieldSelector {
    pub field_path: String,
}

// ============================================================================
// Resolved payload
// ============================================================================

/// Bytes and permission bits of one projected file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProjection {
    pub data: Vec<u8>,
    pub mode: PermissionMode,
}

impl FileProjection {
    pub fn new(data: impl Into<Vec<u8>>, mode: PermissionMode) -> Self {
        Self {
            data: data.into(),
            mode,
        }
    }
}

/// Where a resolved path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrigin {
    /// Written by the user (item path, context-field path)
    Explicit,
    /// Taken from a raw object key
    Derived,
}

/// One file produced by resolving a source, before merging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: String,
    pub projection: FileProjection,
    pub origin: PathOrigin,
    pub source_index: usize,
}

/// Merged `relative path → file` mapping of a projected volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload(BTreeMap<String, FileProjection>);

impl Payload {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, path: impl Into<String>, file: FileProjection) -> Option<FileProjection> {
        self.0.insert(path.into(), file)
    }

    pub fn get(&self, path: &str) -> Option<&FileProjection> {
        self.0.get(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileProjection> {
        self.0.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileProjection)> {
        self.0.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn total_bytes(&self) -> usize {
        self.0.values().map(|f| f.data.len()).sum()
    }
}

impl FromIterator<(String, FileProjection)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, FileProjection)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Payload {
    type Item = (String, FileProjection);
    type IntoIter = std::collections::btree_map::IntoIter<String, FileProjection>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Permission modes in manifests: integers are taken as-is, strings are read
/// as octal (`"0644"`, `"0o600"`, `"644"`).
pub(crate) mod octal_mode {
    use super::PermissionMode;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMode {
        Int(u32),
        Text(String),
    }

    pub fn parse(text: &str) -> Result<PermissionMode, String> {
        let digits = text
            .trim()
            .trim_start_matches("0o")
            .trim_start_matches("0O");
        let mode = u32::from_str_radix(digits, 8)
            .map_err(|_| format!("invalid octal permission mode '{}'", text))?;
        if mode > 0o7777 {
            return Err(format!("permission mode '{}' is out of range", text));
        }
        Ok(mode)
    }

    pub fn serialize<S: Serializer>(
        mode: &Option<PermissionMode>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match mode {
            Some(m) => serializer.serialize_str(&format!("{:04o}", m)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<PermissionMode>, D::Error> {
        match Option::<RawMode>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawMode::Int(m)) if m <= 0o7777 => Ok(Some(m)),
            Some(RawMode::Int(m)) => Err(de::Error::custom(format!(
                "permission mode {} is out of range",
                m
            ))),
            Some(RawMode::Text(t)) => parse(&t).map(Some).map_err(de::Error::custom),
        }
    }
}
