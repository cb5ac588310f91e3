// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Object store and node capacity providers
//!
//! Implementations of the lookup capabilities declared in
//! `domain::lookup`:
//!
//! - `InMemoryObjectStore` - process-local, used by tests and embedders
//! - `FileObjectStore` - read once from an `ObjectStore` YAML manifest
//! - `StaticNodeAllocatable` - fixed capacity, usually from `ProjectorConfig`

pub mod file;
pub mod memory;

pub use file::{FileObjectStore, ObjectStoreManifest, STORE_KIND};
pub use memory::InMemoryObjectStore;

use crate::domain::lookup::{LookupError, NodeAllocatable};
use crate::domain::workload::ResourceList;
use async_trait::async_trait;

/// Node capacity known up front
#[derive(Debug, Clone, Default)]
pub struct StaticNodeAllocatable {
    resources: ResourceList,
}

impl StaticNodeAllocatable {
    pub fn new(resources: ResourceList) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl NodeAllocatable for StaticNodeAllocatable {
    async fn allocatable(&self) -> Result<ResourceList, LookupError> {
        Ok(self.resources.clone())
    }
}
