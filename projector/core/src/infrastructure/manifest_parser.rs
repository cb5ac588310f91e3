// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Projected Volume Manifest Parser
//!
//! Parses K8s-style `ProjectedVolume` manifests into [`ProjectionRequest`]s.
//!
//! # Manifest Format
//!
//! ```yaml
//! apiVersion: projector.dev/v1
//! kind: ProjectedVolume
//! metadata:
//!   name: app-context
//! spec:
//!   defaultMode: "0644"
//!   workload:
//!     metadata:
//!       name: api-0
//!       namespace: payments
//!       labels:
//!         tier: backend
//!     spec:
//!       containers:
//!         - name: api
//!           resources:
//!             limits:
//!               cpu: 500m
//!   sources:
//!     - secret:
//!         name: db
//!         items:
//!           - key: username
//!             path: db/user
//!     - contextField:
//!         items:
//!           - path: meta/labels
//!             fieldRef:
//!               fieldPath: metadata.labels
//! ```
//!
//! When `defaultMode` is omitted the node's configured default applies.

use crate::domain::node_config::API_VERSION;
use crate::domain::projection::{octal_mode, PermissionMode, ProjectionRequest, SourceSpec};
use crate::domain::workload::Workload;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

pub const VOLUME_KIND: &str = "ProjectedVolume";

// ============================================================================
// Manifest Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedVolumeManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: VolumeMetadata,
    pub spec: ProjectedVolumeSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMetadata {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedVolumeSpec {
    #[serde(default, with = "octal_mode", skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<PermissionMode>,

    pub workload: Workload,

    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

impl ProjectedVolumeManifest {
    pub fn validate(&self) -> Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }
        if self.kind != VOLUME_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, VOLUME_KIND);
        }
        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }
        if self.spec.workload.metadata.name.is_empty() {
            anyhow::bail!("spec.workload.metadata.name cannot be empty");
        }
        Ok(())
    }

    /// Build the request. A workload without a uid gets a name-based one,
    /// stable across runs for the same namespace and name.
    pub fn into_request(self, fallback_mode: Option<PermissionMode>) -> ProjectionRequest {
        let mut workload = self.spec.workload;
        if workload.metadata.uid.is_empty() {
            let name = format!("{}/{}", workload.metadata.namespace, workload.metadata.name);
            workload.metadata.uid = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();
        }

        ProjectionRequest {
            volume_name: self.metadata.name,
            sources: self.spec.sources,
            default_mode: self.spec.default_mode.or(fallback_mode),
            workload,
        }
    }
}

// ============================================================================
// Parser API
// ============================================================================

pub struct ManifestParser;

impl ManifestParser {
    /// Parse a projected volume manifest from YAML string
    pub fn parse_yaml(yaml: &str) -> Result<ProjectedVolumeManifest> {
        let manifest: ProjectedVolumeManifest =
            serde_yaml::from_str(yaml).context("Failed to parse YAML manifest")?;

        manifest
            .validate()
            .map_err(|e| anyhow!("Manifest validation failed: {}", e))?;

        Ok(manifest)
    }

    /// Parse a projected volume manifest from YAML file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<ProjectedVolumeManifest> {
        let yaml = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read manifest file: {:?}", path.as_ref()))?;

        Self::parse_yaml(&yaml)
    }
}

// ============================================================================
// Tests
// ============================================================================
