// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Payload Aggregator Application Service
//!
//! Resolves every source of a [`ProjectionRequest`] in declaration order and
//! merges the results into one [`Payload`]. Pure with respect to the
//! filesystem: nothing is written here.
//!
//! # Collision policy
//!
//! - Two explicit paths landing on the same name reject the whole request.
//! - An explicit path always owns its name.
//! - A derived path (raw object key) that collides is renamed by prefixing
//!   its file name with the declaring source's ordinal: `shared/key` from
//!   source #1 becomes `shared/1_key`.
//! - When the prefixed name is taken too, the file is dropped and a
//!   `PathCollision` error is recorded.

use crate::application::source_resolver::SourceResolver;
use crate::domain::errors::{AggregateError, Partial, ProjectionError};
use crate::domain::lookup::{NodeAllocatable, ObjectStore};
use crate::domain::projection::{FileProjection, PathOrigin, Payload, ProjectionRequest, ResolvedFile};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PayloadAggregator {
    resolver: Option<SourceResolver>,
}

impl PayloadAggregator {
    /// `store == None` models a host without a configured object store;
    /// every aggregation then fails with `StoreUnavailable`.
    pub fn new(store: Option<Arc<dyn ObjectStore>>, node: Arc<dyn NodeAllocatable>) -> Self {
        Self {
            resolver: store.map(|store| SourceResolver::new(store, node)),
        }
    }

    pub async fn aggregate(
        &self,
        request: &ProjectionRequest,
    ) -> Result<Partial<Payload>, ProjectionError> {
        let volume = &request.volume_name;

        let Some(default_mode) = request.default_mode else {
            return Err(ProjectionError::MissingDefaultMode {
                volume: volume.clone(),
            });
        };

        let Some(resolver) = &self.resolver else {
            return Err(ProjectionError::StoreUnavailable {
                volume: volume.clone(),
            });
        };

        request.validate_paths()?;

        debug!(
            volume = %volume,
            workload = %request.identity(),
            sources = request.sources.len(),
            "Aggregating projection payload"
        );

        let mut merger = PayloadMerger::default();
        let mut errors = AggregateError::new();

        for (index, source) in request.sources.iter().enumerate() {
            let resolved = resolver
                .resolve(index, source, default_mode, &request.workload)
                .await;
            errors.extend(resolved.errors);
            for file in resolved.value {
                merger.insert(file, &mut errors);
            }
        }

        let payload = merger.into_payload();
        if errors.is_empty() {
            info!(volume = %volume, files = payload.len(), "Payload aggregated");
        } else {
            warn!(
                volume = %volume,
                files = payload.len(),
                errors = errors.len(),
                "Payload aggregated with errors: {}",
                errors
            );
        }

        Ok(Partial::new(payload, errors))
    }
}

/// Accumulates resolved files while applying the collision policy
#[derive(Default)]
struct PayloadMerger {
    payload: Payload,
    owners: HashMap<String, (PathOrigin, usize)>,
}

impl PayloadMerger {
    fn insert(&mut self, file: ResolvedFile, errors: &mut AggregateError) {
        let Some(&(held_origin, held_index)) = self.owners.get(&file.path) else {
            self.place(file.path, file.projection, file.origin, file.source_index);
            return;
        };

        match (file.origin, held_origin) {
            (PathOrigin::Derived, _) => {
                let renamed = prefixed(&file.path, file.source_index);
                self.relocate(&file.path, renamed, file.projection, file.origin, file.source_index, errors);
            }
            (PathOrigin::Explicit, PathOrigin::Derived) => {
                // the explicit file takes the bare name; the derived one moves aside
                if let Some(displaced) = self.take(&file.path) {
                    let renamed = prefixed(&file.path, held_index);
                    self.relocate(&file.path, renamed, displaced, PathOrigin::Derived, held_index, errors);
                }
                self.place(file.path, file.projection, file.origin, file.source_index);
            }
            (PathOrigin::Explicit, PathOrigin::Explicit) => {
                warn!(
                    "Path {} from source #{} already declared by source #{}",
                    file.path, file.source_index, held_index
                );
                errors.push(ProjectionError::PathCollision {
                    path: file.path,
                    source_index: file.source_index,
                });
            }
        }
    }

    fn relocate(
        &mut self,
        original: &str,
        renamed: String,
        projection: FileProjection,
        origin: PathOrigin,
        source_index: usize,
        errors: &mut AggregateError,
    ) {
        if self.owners.contains_key(&renamed) {
            warn!(
                "Path {} from source #{} collides and {} is taken; dropping it",
                original, source_index, renamed
            );
            errors.push(ProjectionError::PathCollision {
                path: original.to_string(),
                source_index,
            });
            return;
        }

        warn!(
            "Path {} from source #{} collides; projecting it as {}",
            original, source_index, renamed
        );
        self.place(renamed, projection, origin, source_index);
    }

    fn place(&mut self, path: String, projection: FileProjection, origin: PathOrigin, source_index: usize) {
        self.owners.insert(path.clone(), (origin, source_index));
        self.payload.insert(path, projection);
    }

    fn take(&mut self, path: &str) -> Option<FileProjection> {
        self.owners.remove(path);
        self.payload.remove(path)
    }

    fn into_payload(self) -> Payload {
        self.payload
    }
}

/// `shared/key` + 1 → `shared/1_key`
fn prefixed(path: &str, ordinal: usize) -> String {
    match path.rsplit_once('/') {
        Some((dir, name)) => format!("{}/{}_{}", dir, ordinal, name),
        None => format!("{}_{}", ordinal, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::projection::{ConfigProjection, KeyToPath, SecretProjection, SourceSpec};
    use crate::domain::workload::Workload;
    use crate::infrastructure::store::{InMemoryObjectStore, StaticNodeAllocatable};

    fn aggregator(store: InMemoryObjectStore) -> PayloadAggregator {
        PayloadAggregator::new(
            Some(Arc::new(store)),
            Arc::new(StaticNodeAllocatable::default()),
        )
    }

    fn secret(name: &str, items: Vec<KeyToPath>) -> SourceSpec {
        SourceSpec::Secret(SecretProjection {
            name: name.to_string(),
            items,
        })
    }

    fn config(name: &str, items: Vec<KeyToPath>) -> SourceSpec {
        SourceSpec::Config(ConfigProjection {
            name: name.to_string(),
            items,
        })
    }

    fn file(path: &str, data: &str, origin: PathOrigin, source_index: usize) -> ResolvedFile {
        ResolvedFile {
            path: path.to_string(),
            projection: FileProjection::new(data, 0o644),
            origin,
            source_index,
        }
    }

    #[test]
    fn test_prefixed() {
        assert_eq!(prefixed("shared/key", 1), "shared/1_key");
        assert_eq!(prefixed("token", 3), "3_token");
    }

    #[test]
    fn test_merger_derived_after_explicit_is_renamed() {
        let mut merger = PayloadMerger::default();
        let mut errors = AggregateError::new();
        merger.insert(file("shared/key", "explicit", PathOrigin::Explicit, 0), &mut errors);
        merger.insert(file("shared/key", "derived", PathOrigin::Derived, 1), &mut errors);

        let payload = merger.into_payload();
        assert!(errors.is_empty());
        assert_eq!(payload.get("shared/key").unwrap().data, b"explicit".to_vec());
        assert_eq!(payload.get("shared/1_key").unwrap().data, b"derived".to_vec());
    }

    #[test]
    fn test_merger_explicit_displaces_derived() {
        let mut merger = PayloadMerger::default();
        let mut errors = AggregateError::new();
        merger.insert(file("key", "derived", PathOrigin::Derived, 0), &mut errors);
        merger.insert(file("key", "explicit", PathOrigin::Explicit, 2), &mut errors);

        let payload = merger.into_payload();
        assert!(errors.is_empty());
        assert_eq!(payload.get("key").unwrap().data, b"explicit".to_vec());
        assert_eq!(payload.get("0_key").unwrap().data, b"derived".to_vec());
    }

    #[test]
    fn test_merger_records_unresolvable_collision() {
        let mut merger = PayloadMerger::default();
        let mut errors = AggregateError::new();
        merger.insert(file("key", "a", PathOrigin::Derived, 0), &mut errors);
        merger.insert(file("1_key", "b", PathOrigin::Derived, 0), &mut errors);
        merger.insert(file("key", "c", PathOrigin::Derived, 1), &mut errors);

        let payload = merger.into_payload();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.get("key").unwrap().data, b"a".to_vec());
        assert!(matches!(
            errors.iter().next(),
            Some(ProjectionError::PathCollision { path, source_index: 1 }) if path == "key"
        ));
    }

    #[tokio::test]
    async fn test_missing_default_mode_is_fatal() {
        let request = ProjectionRequest::new("vol", Workload::default())
            .with_source(secret("db", vec![]))
            .with_default_mode(None);
        let result = aggregator(InMemoryObjectStore::new()).aggregate(&request).await;
        assert!(matches!(result, Err(ProjectionError::MissingDefaultMode { .. })));
    }

    #[tokio::test]
    async fn test_missing_store_is_fatal() {
        let aggregator = PayloadAggregator::new(None, Arc::new(StaticNodeAllocatable::default()));
        let request = ProjectionRequest::new("vol", Workload::default());
        let result = aggregator.aggregate(&request).await;
        assert!(matches!(result, Err(ProjectionError::StoreUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_explicit_conflict_rejected_before_resolution() {
        let request = ProjectionRequest::new("vol", Workload::default())
            .with_source(secret("missing-a", vec![KeyToPath::new("k", "same")]))
            .with_source(secret("missing-b", vec![KeyToPath::new("k", "same")]));
        let result = aggregator(InMemoryObjectStore::new()).aggregate(&request).await;
        assert!(matches!(result, Err(ProjectionError::ConflictingPaths { .. })));
    }

    #[tokio::test]
    async fn test_failed_source_keeps_siblings() {
        let store = InMemoryObjectStore::new();
        store.put_secret("default", "db", [("user", "alice")]);
        let request = ProjectionRequest::new("vol", Workload::default())
            .with_source(secret("db", vec![]))
            .with_source(config("absent", vec![]));

        let partial = aggregator(store).aggregate(&request).await.unwrap();
        assert_eq!(partial.value.len(), 1);
        assert!(partial.value.contains("user"));
        assert_eq!(partial.errors.len(), 1);
        assert!(partial.errors.to_string().contains("default/absent"));
    }

    #[tokio::test]
    async fn test_derived_keys_from_two_sources() {
        let store = InMemoryObjectStore::new();
        store.put_secret("default", "a", [("token", "from-a")]);
        store.put_config("default", "b", [("token", "from-b")]);
        let request = ProjectionRequest::new("vol", Workload::default())
            .with_source(secret("a", vec![]))
            .with_source(config("b", vec![]));

        let partial = aggregator(store).aggregate(&request).await.unwrap();
        assert!(partial.is_complete());
        assert_eq!(partial.value.get("token").unwrap().data, b"from-a".to_vec());
        assert_eq!(partial.value.get("1_token").unwrap().data, b"from-b".to_vec());
    }
}
