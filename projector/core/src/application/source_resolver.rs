// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Source Resolver Application Service
//!
//! Turns one declared [`SourceSpec`] into the files it contributes:
//!
//! - **Secret / Config** - fetched through the injected [`ObjectStore`];
//!   either every key (path = key) or only the listed items.
//! - **Context field** - values read from the owning [`Workload`] by the
//!   field extractor, with lines sorted for stable content.
//!
//! Resolution never fails as a whole. Lookup failures, missing keys, bad
//! paths and extraction errors are recorded in the returned
//! [`AggregateError`] and the affected source or item is skipped.

use crate::domain::errors::{AggregateError, Partial, ProjectionError};
use crate::domain::field_path::{extract_field_path, extract_resource_value, sort_lines};
use crate::domain::lookup::{LookupError, NodeAllocatable, ObjectKind, ObjectStore, SecretData};
use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::projection::{
    ContextFieldProjection, FieldSelector, FileProjection, KeyToPath, PathOrigin, PermissionMode,
    ResolvedFile, SourceSpec,
};
use crate::domain::workload::{ResourceList, Workload};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SourceResolver {
    store: Arc<dyn ObjectStore>,
    node: Arc<dyn NodeAllocatable>,
    sanitizer: PathSanitizer,
}

impl SourceResolver {
    pub fn new(store: Arc<dyn ObjectStore>, node: Arc<dyn NodeAllocatable>) -> Self {
        Self {
            store,
            node,
            sanitizer: PathSanitizer::new(),
        }
    }

    /// Resolve one source declared at position `index`
    pub async fn resolve(
        &self,
        index: usize,
        source: &SourceSpec,
        default_mode: PermissionMode,
        workload: &Workload,
    ) -> Partial<Vec<ResolvedFile>> {
        debug!(source = %source.describe(), index, "Resolving projection source");

        let namespace = workload.namespace();
        match source {
            SourceSpec::Secret(secret) => {
                match self.store.get_secret(namespace, &secret.name).await {
                    Ok(data) => self.project_keys(
                        index,
                        KeyedObject::new(ObjectKind::Secret, namespace, &secret.name),
                        &secret.items,
                        data,
                        default_mode,
                    ),
                    Err(e) => fetch_failed(ObjectKind::Secret, namespace, &secret.name, e),
                }
            }
            SourceSpec::Config(config) => {
                match self.store.get_config(namespace, &config.name).await {
                    Ok(data) => {
                        let data: SecretData = data
                            .into_iter()
                            .map(|(k, v)| (k, v.into_bytes()))
                            .collect();
                        self.project_keys(
                            index,
                            KeyedObject::new(ObjectKind::Config, namespace, &config.name),
                            &config.items,
                            data,
                            default_mode,
                        )
                    }
                    Err(e) => fetch_failed(ObjectKind::Config, namespace, &config.name, e),
                }
            }
            SourceSpec::ContextField(fields) => {
                self.project_fields(index, fields, default_mode, workload).await
            }
        }
    }

    /// Project the keys of a fetched key/value object
    fn project_keys(
        &self,
        index: usize,
        object: KeyedObject<'_>,
        items: &[KeyToPath],
        mut data: SecretData,
        default_mode: PermissionMode,
    ) -> Partial<Vec<ResolvedFile>> {
        let mut errors = AggregateError::new();

        let candidates: Vec<(String, Vec<u8>, PermissionMode, PathOrigin)> = if items.is_empty() {
            data.into_iter()
                .map(|(key, value)| (key, value, default_mode, PathOrigin::Derived))
                .collect()
        } else {
            let mut selected = Vec::with_capacity(items.len());
            for item in items {
                let Some(value) = data.remove(&item.key) else {
                    warn!(
                        "{} {}/{} has no key {}",
                        object.kind, object.namespace, object.name, item.key
                    );
                    errors.push(ProjectionError::MissingKey {
                        kind: object.kind,
                        namespace: object.namespace.to_string(),
                        name: object.name.to_string(),
                        key: item.key.clone(),
                    });
                    return Partial::new(Vec::new(), errors);
                };
                selected.push((
                    item.path.clone(),
                    value,
                    item.mode.unwrap_or(default_mode),
                    PathOrigin::Explicit,
                ));
            }
            selected
        };

        let mut files = Vec::with_capacity(candidates.len());
        for (path, value, mode, origin) in candidates {
            match self.sanitizer.canonicalize(&path) {
                Ok(path) => files.push(ResolvedFile {
                    path,
                    projection: FileProjection::new(value, mode),
                    origin,
                    source_index: index,
                }),
                Err(source) => errors.push(ProjectionError::InvalidPath {
                    source_index: index,
                    source,
                }),
            }
        }

        debug!(
            "{} {}/{} contributed {} files",
            object.kind,
            object.namespace,
            object.name,
            files.len()
        );
        Partial::new(files, errors)
    }

    /// Project values extracted from the workload descriptor
    async fn project_fields(
        &self,
        index: usize,
        fields: &ContextFieldProjection,
        default_mode: PermissionMode,
        workload: &Workload,
    ) -> Partial<Vec<ResolvedFile>> {
        let mut errors = AggregateError::new();
        let mut files = Vec::with_capacity(fields.items.len());
        let mut allocatable: Option<ResourceList> = None;

        for item in &fields.items {
            let path = match self.sanitizer.canonicalize(&item.path) {
                Ok(path) => path,
                Err(source) => {
                    errors.push(ProjectionError::InvalidPath {
                        source_index: index,
                        source,
                    });
                    continue;
                }
            };

            let extracted = match &item.selector {
                FieldSelector::FieldRef(field) => extract_field_path(workload, &field.field_path),
                FieldSelector::ResourceFieldRef(resource) => {
                    if allocatable.is_none() && resource.needs_allocatable(workload) {
                        match self.node.allocatable().await {
                            Ok(resources) => allocatable = Some(resources),
                            Err(source) => {
                                warn!("Unable to read node allocatable for {}: {}", path, source);
                                errors.push(ProjectionError::AllocatableLookup { path, source });
                                continue;
                            }
                        }
                    }
                    extract_resource_value(workload, resource, allocatable.as_ref())
                }
            };

            match extracted {
                Ok(value) => files.push(ResolvedFile {
                    projection: FileProjection::new(
                        sort_lines(&value),
                        item.mode.unwrap_or(default_mode),
                    ),
                    path,
                    origin: PathOrigin::Explicit,
                    source_index: index,
                }),
                Err(source) => {
                    warn!("Unable to extract field for {}: {}", path, source);
                    errors.push(ProjectionError::FieldExtraction { path, source });
                }
            }
        }

        Partial::new(files, errors)
    }
}

/// Identifies the object whose keys are being projected
struct KeyedObject<'a> {
    kind: ObjectKind,
    namespace: &'a str,
    name: &'a str,
}

impl<'a> KeyedObject<'a> {
    fn new(kind: ObjectKind, namespace: &'a str, name: &'a str) -> Self {
        Self {
            kind,
            namespace,
            name,
        }
    }
}

fn fetch_failed(
    kind: ObjectKind,
    namespace: &str,
    name: &str,
    source: LookupError,
) -> Partial<Vec<ResolvedFile>> {
    warn!("Couldn't get {} {}/{}: {}", kind, namespace, name, source);
    let mut errors = AggregateError::new();
    errors.push(ProjectionError::SourceFetch {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
        source,
    });
    Partial::new(Vec::new(), errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field_path::ResourceFieldSelector;
    use crate::domain::projection::{
        ConfigProjection, ContextFieldFile, ObjectFieldSelector, SecretProjection,
    };
    use crate::domain::quantity::Quantity;
    use crate::domain::workload::{Container, RESOURCE_MEMORY};
    use crate::infrastructure::store::{InMemoryObjectStore, StaticNodeAllocatable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNode {
        calls: AtomicUsize,
        resources: Result<ResourceList, LookupError>,
    }

    #[async_trait::async_trait]
    impl NodeAllocatable for CountingNode {
        async fn allocatable(&self) -> Result<ResourceList, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.resources.clone()
        }
    }

    fn workload() -> Workload {
        let mut workload = Workload::default();
        workload.metadata.name = "api-0".to_string();
        workload.metadata.namespace = "payments".to_string();
        workload
            .metadata
            .labels
            .insert("tier".to_string(), "backend".to_string());
        workload
            .metadata
            .labels
            .insert("env".to_string(), "test".to_string());
        workload.spec.containers.push(Container {
            name: "api".to_string(),
            ..Default::default()
        });
        workload
    }

    fn store() -> Arc<InMemoryObjectStore> {
        let store = InMemoryObjectStore::new();
        store.put_secret(
            "payments",
            "db",
            [("username", "alice"), ("password", "s3cret")],
        );
        store.put_config("payments", "settings", [("log_level", "debug")]);
        Arc::new(store)
    }

    fn resolver() -> SourceResolver {
        SourceResolver::new(store(), Arc::new(StaticNodeAllocatable::default()))
    }

    fn field(path: &str, field_path: &str) -> ContextFieldFile {
        ContextFieldFile {
            path: path.to_string(),
            selector: FieldSelector::FieldRef(ObjectFieldSelector {
                field_path: field_path.to_string(),
            }),
            mode: None,
        }
    }

    #[tokio::test]
    async fn test_secret_all_keys_are_derived() {
        let source = SourceSpec::Secret(SecretProjection {
            name: "db".to_string(),
            items: vec![],
        });
        let resolved = resolver().resolve(0, &source, 0o644, &workload()).await;

        assert!(resolved.is_complete());
        let paths: Vec<_> = resolved.value.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["password", "username"]);
        assert!(resolved.value.iter().all(|f| f.origin == PathOrigin::Derived));
    }

    #[tokio::test]
    async fn test_secret_items_with_mode_override() {
        let mut item = KeyToPath::new("username", "db/user");
        item.mode = Some(0o400);
        let source = SourceSpec::Secret(SecretProjection {
            name: "db".to_string(),
            items: vec![item],
        });
        let resolved = resolver().resolve(2, &source, 0o644, &workload()).await;

        assert!(resolved.is_complete());
        assert_eq!(resolved.value.len(), 1);
        let file = &resolved.value[0];
        assert_eq!(file.path, "db/user");
        assert_eq!(file.projection, FileProjection::new("alice", 0o400));
        assert_eq!(file.origin, PathOrigin::Explicit);
        assert_eq!(file.source_index, 2);
    }

    #[tokio::test]
    async fn test_missing_secret_records_one_error() {
        let source = SourceSpec::Secret(SecretProjection {
            name: "nope".to_string(),
            items: vec![],
        });
        let resolved = resolver().resolve(0, &source, 0o644, &workload()).await;

        assert!(resolved.value.is_empty());
        assert_eq!(resolved.errors.len(), 1);
        assert!(resolved.errors.to_string().contains("payments/nope"));
    }

    #[tokio::test]
    async fn test_missing_key_drops_whole_source() {
        let source = SourceSpec::Config(ConfigProjection {
            name: "settings".to_string(),
            items: vec![
                KeyToPath::new("log_level", "level"),
                KeyToPath::new("absent", "absent"),
            ],
        });
        let resolved = resolver().resolve(0, &source, 0o644, &workload()).await;

        assert!(resolved.value.is_empty());
        assert!(matches!(
            resolved.errors.iter().next(),
            Some(ProjectionError::MissingKey { key, .. }) if key == "absent"
        ));
    }

    #[tokio::test]
    async fn test_invalid_item_path_skips_only_that_file() {
        let source = SourceSpec::Secret(SecretProjection {
            name: "db".to_string(),
            items: vec![
                KeyToPath::new("username", "../escape"),
                KeyToPath::new("password", "db/pass"),
            ],
        });
        let resolved = resolver().resolve(0, &source, 0o644, &workload()).await;

        assert_eq!(resolved.value.len(), 1);
        assert_eq!(resolved.value[0].path, "db/pass");
        assert_eq!(resolved.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_context_fields_sorted_and_failures_skipped() {
        let source = SourceSpec::ContextField(ContextFieldProjection {
            items: vec![
                field("./meta/labels", "metadata.labels"),
                field("meta/bogus", "metadata.bogus"),
                field("meta/name", "metadata.name"),
            ],
        });
        let resolved = resolver().resolve(1, &source, 0o600, &workload()).await;

        assert_eq!(resolved.errors.len(), 1);
        assert_eq!(resolved.value.len(), 2);
        let labels = &resolved.value[0];
        assert_eq!(labels.path, "meta/labels");
        assert_eq!(labels.projection.data, b"env=\"test\"\ntier=\"backend\"".to_vec());
        assert_eq!(labels.projection.mode, 0o600);
        assert_eq!(resolved.value[1].projection.data, b"api-0".to_vec());
    }

    #[tokio::test]
    async fn test_allocatable_fetched_lazily_once() {
        let mut allocatable = ResourceList::new();
        allocatable.insert(RESOURCE_MEMORY.to_string(), Quantity::parse("1Gi").unwrap());
        let node = Arc::new(CountingNode {
            calls: AtomicUsize::new(0),
            resources: Ok(allocatable),
        });
        let resolver = SourceResolver::new(store(), node.clone());

        let reference = |path: &str| ContextFieldFile {
            path: path.to_string(),
            selector: FieldSelector::ResourceFieldRef(ResourceFieldSelector {
                container_name: "api".to_string(),
                resource: "limits.memory".to_string(),
                divisor: Some(Quantity::parse("1Mi").unwrap()),
            }),
            mode: None,
        };
        let source = SourceSpec::ContextField(ContextFieldProjection {
            items: vec![reference("mem_a"), reference("mem_b"), field("name", "metadata.name")],
        });
        let resolved = resolver.resolve(0, &source, 0o644, &workload()).await;

        assert!(resolved.is_complete());
        assert_eq!(resolved.value[0].projection.data, b"1024".to_vec());
        assert_eq!(node.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_allocatable_failure_skips_item() {
        let node = Arc::new(CountingNode {
            calls: AtomicUsize::new(0),
            resources: Err(LookupError::Unavailable("node agent down".to_string())),
        });
        let resolver = SourceResolver::new(store(), node);
        let source = SourceSpec::ContextField(ContextFieldProjection {
            items: vec![
                ContextFieldFile {
                    path: "cpu".to_string(),
                    selector: FieldSelector::ResourceFieldRef(ResourceFieldSelector {
                        container_name: "api".to_string(),
                        resource: "limits.cpu".to_string(),
                        divisor: None,
                    }),
                    mode: None,
                },
                field("name", "metadata.name"),
            ],
        });
        let resolved = resolver.resolve(0, &source, 0o644, &workload()).await;

        assert_eq!(resolved.value.len(), 1);
        assert!(matches!(
            resolved.errors.iter().next(),
            Some(ProjectionError::AllocatableLookup { .. })
        ));
    }
}
