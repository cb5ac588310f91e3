// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Projector Node Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing the
// node a projector runs on:
// - Node identity and allocatable resources (effective capacity for
//   resource references without a declared limit)
// - Volume defaults (permission mode, supplemental group)
// - Location of the object store fixture file
// - Logging settings

use crate::domain::projection::{octal_mode, PermissionMode, DEFAULT_MODE};
use crate::domain::workload::ResourceList;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "projector.dev/v1";
pub const CONFIG_KIND: &str = "ProjectorConfig";

/// Top-level Kubernetes-style projector configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectorConfigManifest {
    /// API version (must be "projector.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ProjectorConfig")
    pub kind: String,

    pub metadata: ConfigMetadata,

    pub spec: ProjectorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectorConfigSpec {
    #[serde(default)]
    pub node: NodeSettings,

    #[serde(default)]
    pub volume: VolumeDefaults,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Node name reported to workloads (`spec.nodeName`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Allocatable resources of this node
    #[serde(default)]
    pub allocatable: ResourceList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeDefaults {
    /// Mode for projected files without an override
    #[serde(default = "default_mode", with = "octal_mode")]
    pub default_mode: Option<PermissionMode>,

    /// Supplemental group given read access to materialized trees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_group: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// YAML file holding secret and config objects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_mode() -> Option<PermissionMode> {
    Some(DEFAULT_MODE)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for VolumeDefaults {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
            fs_group: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ProjectorConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "projector-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ConfigMetadata {
                name: hostname.clone(),
                labels: None,
            },
            spec: ProjectorConfigSpec {
                node: NodeSettings {
                    name: Some(hostname),
                    allocatable: ResourceList::new(),
                },
                ..Default::default()
            },
        }
    }
}

impl ProjectorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PROJECTOR_CONFIG_PATH environment variable
    /// 2. ./projector-config.yaml (working directory)
    /// 3. ~/.projector/config.yaml (user home)
    /// 4. /etc/projector/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PROJECTOR_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./projector-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".projector").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/projector/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PROJECTOR_FS_GROUP") {
            match val.parse::<u32>() {
                Ok(gid) => {
                    tracing::info!("Environment override: PROJECTOR_FS_GROUP={}", gid);
                    self.spec.volume.fs_group = Some(gid);
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for PROJECTOR_FS_GROUP: '{}'. Expected a numeric gid. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("PROJECTOR_DEFAULT_MODE") {
            match octal_mode::parse(&val) {
                Ok(mode) => {
                    tracing::info!("Environment override: PROJECTOR_DEFAULT_MODE={:04o}", mode);
                    self.spec.volume.default_mode = Some(mode);
                }
                Err(e) => tracing::warn!("Ignoring PROJECTOR_DEFAULT_MODE: {}", e),
            }
        }

        if let Ok(val) = std::env::var("PROJECTOR_STORE_PATH") {
            tracing::info!("Environment override: PROJECTOR_STORE_PATH={}", val);
            self.spec.store.path = Some(PathBuf::from(val));
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != CONFIG_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, CONFIG_KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.volume.default_mode.is_none() {
            anyhow::bail!("spec.volume.defaultMode must be set");
        }

        for (resource, quantity) in &self.spec.node.allocatable {
            if quantity.milli_value() < 0 {
                anyhow::bail!("Allocatable {} cannot be negative", resource);
            }
        }

        if !matches!(self.spec.logging.format.as_str(), "compact" | "json") {
            anyhow::bail!(
                "Invalid logging format '{}'. Expected 'compact' or 'json'",
                self.spec.logging.format
            );
        }

        Ok(())
    }
}
