// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Lookup Capabilities - Anti-Corruption Layer for the host
//!
//! The projector never talks to a credential store or to the node agent
//! directly. Both are injected as capability traits so the engine can be
//! exercised with in-memory fakes and so no transport leaks into the domain.
//!
//! | Trait | Provides | Implementations |
//! |-------|----------|-----------------|
//! | `ObjectStore` | secret and config key/value objects | `InMemoryObjectStore`, `FileObjectStore` |
//! | `NodeAllocatable` | effective node capacity | `StaticNodeAllocatable` |

use crate::domain::workload::ResourceList;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Raw secret data: key → bytes
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Raw configuration data: key → text
pub type ConfigData = BTreeMap<String, String>;

/// Source of named secret and configuration objects, keyed by namespace
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a secret object
    ///
    /// # Returns
    /// * `Ok(SecretData)` - every key of the secret
    /// * `Err(LookupError::NotFound)` if the secret does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<SecretData, LookupError>;

    /// Fetch a configuration object
    async fn get_config(&self, namespace: &str, name: &str) -> Result<ConfigData, LookupError>;
}

/// Effective resource capacity of the node hosting the workload
#[async_trait]
pub trait NodeAllocatable: Send + Sync {
    async fn allocatable(&self) -> Result<ResourceList, LookupError>;
}

/// Kind of object requested from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Secret,
    Config,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Secret => write!(f, "secret"),
            ObjectKind::Config => write!(f, "config"),
        }
    }
}

/// Lookup errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ObjectKind,
        namespace: String,
        name: String,
    },

    #[error("lookup backend unavailable: {0}")]
    Unavailable(String),

    #[error("lookup failed: {0}")]
    Backend(String),
}

impl LookupError {
    pub fn not_found(kind: ObjectKind, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}
