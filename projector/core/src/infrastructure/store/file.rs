// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File-backed object store
//!
//! Loads secret and config objects from a Kubernetes-style manifest:
//!
//! ```yaml
//! apiVersion: projector.dev/v1
//! kind: ObjectStore
//! metadata:
//!   name: local-fixtures
//! spec:
//!   secrets:
//!     - name: db
//!       namespace: payments
//!       data:          # base64
//!         password: czNjcmV0
//!       stringData:    # plain text, wins over data
//!         username: alice
//!   configs:
//!     - name: settings
//!       data:
//!         log_level: debug
//! ```

use super::memory::InMemoryObjectStore;
use crate::domain::lookup::{ConfigData, LookupError, ObjectStore, SecretData};
use crate::domain::node_config::API_VERSION;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const STORE_KIND: &str = "ObjectStore";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: StoreMetadata,
    #[serde(default)]
    pub spec: ObjectStoreSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreMetadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStoreSpec {
    #[serde(default)]
    pub secrets: Vec<SecretObject>,
    #[serde(default)]
    pub configs: Vec<ConfigObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretObject {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Base64-encoded values
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub string_data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigObject {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub data: ConfigData,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl SecretObject {
    fn decode(&self) -> Result<SecretData> {
        let mut decoded = SecretData::new();
        for (key, value) in &self.data {
            let bytes = STANDARD.decode(value.trim()).with_context(|| {
                format!(
                    "secret {}/{} key {} is not valid base64",
                    self.namespace, self.name, key
                )
            })?;
            decoded.insert(key.clone(), bytes);
        }
        for (key, value) in &self.string_data {
            decoded.insert(key.clone(), value.clone().into_bytes());
        }
        Ok(decoded)
    }
}

/// Object store loaded once from a YAML manifest
#[derive(Debug)]
pub struct FileObjectStore {
    path: PathBuf,
    inner: InMemoryObjectStore,
}

impl FileObjectStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read object store file: {:?}", path))?;
        let store = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to load object store from {:?}", path))?;
        info!(
            "Loaded {} objects from {:?}",
            store.inner.object_count(),
            path
        );
        Ok(Self {
            path: path.to_path_buf(),
            ..store
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let manifest: ObjectStoreManifest =
            serde_yaml::from_str(yaml).context("Failed to parse object store YAML")?;

        if manifest.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                manifest.api_version,
                API_VERSION
            );
        }
        if manifest.kind != STORE_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", manifest.kind, STORE_KIND);
        }

        let inner = InMemoryObjectStore::new();
        for secret in &manifest.spec.secrets {
            inner.put_secret(&secret.namespace, &secret.name, secret.decode()?);
        }
        for config in manifest.spec.configs {
            inner.put_config(&config.namespace, &config.name, config.data);
        }

        Ok(Self {
            path: PathBuf::new(),
            inner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<SecretData, LookupError> {
        self.inner.get_secret(namespace, name).await
    }

    async fn get_config(&self, namespace: &str, name: &str) -> Result<ConfigData, LookupError> {
        self.inner.get_config(namespace, name).await
    }
}
