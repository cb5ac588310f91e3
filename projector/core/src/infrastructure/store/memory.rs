// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::lookup::{ConfigData, LookupError, ObjectKind, ObjectStore, SecretData};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

type ObjectKey = (String, String);

/// In-process object store keyed by `(namespace, name)`
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    secrets: RwLock<HashMap<ObjectKey, SecretData>>,
    configs: RwLock<HashMap<ObjectKey, ConfigData>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_secret<I, K, V>(&self, namespace: &str, name: &str, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.secrets
            .write()
            .insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn put_config<I, K, V>(&self, namespace: &str, name: &str, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.configs
            .write()
            .insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn remove_secret(&self, namespace: &str, name: &str) -> bool {
        self.secrets
            .write()
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some()
    }

    pub fn remove_config(&self, namespace: &str, name: &str) -> bool {
        self.configs
            .write()
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some()
    }

    pub fn object_count(&self) -> usize {
        self.secrets.read().len() + self.configs.read().len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<SecretData, LookupError> {
        self.secrets
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| LookupError::not_found(ObjectKind::Secret, namespace, name))
    }

    async fn get_config(&self, namespace: &str, name: &str) -> Result<ConfigData, LookupError> {
        self.configs
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| LookupError::not_found(ObjectKind::Config, namespace, name))
    }
}
