// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume Projector Application Service
//!
//! Drives one projected volume through its lifecycle:
//! - Aggregate: resolve every source into a payload (no filesystem access)
//! - Publish: atomically swap the payload into the target directory
//! - Ownership: hand the published tree to the workload's supplemental group
//!
//! Recorded source errors do not block publishing. The files that did
//! resolve are committed and the errors come back in the report.

use crate::application::aggregator::PayloadAggregator;
use crate::domain::errors::{AggregateError, ProjectionError};
use crate::domain::lookup::{NodeAllocatable, ObjectStore};
use crate::domain::ownership::{OwnershipError, OwnershipManager};
use crate::domain::projection::ProjectionRequest;
use crate::infrastructure::atomic_writer::{AtomicWriter, WriteError, WriteOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Result of a materialization that reached the commit step
#[derive(Debug)]
pub struct MaterializeReport {
    pub volume: String,
    pub target: PathBuf,
    pub outcome: WriteOutcome,
    pub files: usize,
    pub bytes: usize,
    /// Non-fatal errors met while resolving sources
    pub errors: AggregateError,
}

impl MaterializeReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Write(#[from] WriteError),

    /// The data was published but group ownership could not be applied.
    /// `report` still carries the commit outcome and the source errors.
    #[error("published but ownership failed: {source}")]
    Ownership {
        report: Box<MaterializeReport>,
        #[source]
        source: OwnershipError,
    },

    #[error("writer task failed: {0}")]
    Task(String),
}

pub struct VolumeProjector {
    aggregator: PayloadAggregator,
    ownership: Arc<dyn OwnershipManager>,
}

impl VolumeProjector {
    pub fn new(
        store: Option<Arc<dyn ObjectStore>>,
        node: Arc<dyn NodeAllocatable>,
        ownership: Arc<dyn OwnershipManager>,
    ) -> Self {
        Self {
            aggregator: PayloadAggregator::new(store, node),
            ownership,
        }
    }

    pub fn aggregator(&self) -> &PayloadAggregator {
        &self.aggregator
    }

    /// Resolve, publish and hand over one projected volume
    pub async fn materialize(
        &self,
        request: &ProjectionRequest,
        target: &Path,
        fs_group: Option<u32>,
    ) -> Result<MaterializeReport, MaterializeError> {
        let volume = request.volume_name.clone();
        let log_context = format!("volume {} for {}", volume, request.identity());

        let partial = self.aggregator.aggregate(request).await.map_err(|e| {
            error!("{}: aggregation failed: {}", log_context, e);
            e
        })?;
        if !partial.is_complete() {
            warn!(
                "{}: publishing {} files despite errors: {}",
                log_context,
                partial.value.len(),
                partial.errors
            );
        }

        let payload = partial.value;
        let files = payload.len();
        let bytes = payload.total_bytes();

        let tolerated = if fs_group.is_some() {
            self.ownership.added_file_mode()
        } else {
            0
        };
        let writer = AtomicWriter::new(target, log_context.clone()).with_tolerated_mode(tolerated);
        let outcome = tokio::task::spawn_blocking(move || writer.write(&payload))
            .await
            .map_err(|e| MaterializeError::Task(e.to_string()))??;

        let report = MaterializeReport {
            volume,
            target: target.to_path_buf(),
            outcome,
            files,
            bytes,
            errors: partial.errors,
        };

        if let Err(source) = self.apply_ownership(target, fs_group).await {
            error!("{}: {}", log_context, source);
            return Err(MaterializeError::Ownership {
                report: Box::new(report),
                source,
            });
        }

        info!(
            volume = %report.volume,
            files,
            bytes,
            committed = report.outcome.is_committed(),
            "Volume materialized"
        );

        Ok(report)
    }

    /// Re-run the projection against the current sources
    pub async fn refresh(
        &self,
        request: &ProjectionRequest,
        target: &Path,
        fs_group: Option<u32>,
    ) -> Result<MaterializeReport, MaterializeError> {
        self.materialize(request, target, fs_group).await
    }

    /// Remove everything published for the volume and the target if empty
    pub async fn tear_down(&self, volume: &str, target: &Path) -> Result<(), MaterializeError> {
        let writer = AtomicWriter::new(target, format!("volume {}", volume));
        tokio::task::spawn_blocking(move || {
            writer.remove_all()?;
            // leave foreign content alone
            match std::fs::remove_dir(writer.target()) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    warn!("Keeping {:?}: {}", writer.target(), e);
                }
                _ => {}
            }
            Ok::<(), WriteError>(())
        })
        .await
        .map_err(|e| MaterializeError::Task(e.to_string()))??;

        info!(volume = %volume, "Volume torn down");
        Ok(())
    }

    async fn apply_ownership(&self, target: &Path, fs_group: Option<u32>) -> Result<(), OwnershipError> {
        if fs_group.is_none() {
            return Ok(());
        }
        let ownership = self.ownership.clone();
        let target = target.to_path_buf();
        tokio::task::spawn_blocking(move || ownership.apply(&target, fs_group))
            .await
            .map_err(|e| OwnershipError::Walk {
                path: PathBuf::new(),
                reason: e.to_string(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ownership::NoopOwnership;
    use crate::domain::projection::{ConfigProjection, KeyToPath, SecretProjection, SourceSpec};
    use crate::domain::workload::Workload;
    use crate::infrastructure::store::{InMemoryObjectStore, StaticNodeAllocatable};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FailingOwnership(AtomicUsize);

    impl OwnershipManager for FailingOwnership {
        fn apply(&self, dir: &Path, _fs_group: Option<u32>) -> Result<(), OwnershipError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(OwnershipError::Walk {
                path: dir.to_path_buf(),
                reason: "denied".to_string(),
            })
        }
    }

    fn projector(ownership: Arc<dyn OwnershipManager>) -> VolumeProjector {
        let store = InMemoryObjectStore::new();
        store.put_secret("default", "db", [("user", "alice")]);
        VolumeProjector::new(
            Some(Arc::new(store)),
            Arc::new(StaticNodeAllocatable::default()),
            ownership,
        )
    }

    fn request() -> ProjectionRequest {
        ProjectionRequest::new("creds", Workload::default()).with_source(SourceSpec::Secret(
            SecretProjection {
                name: "db".to_string(),
                items: vec![KeyToPath::new("user", "db/user")],
            },
        ))
    }

    #[tokio::test]
    async fn test_materialize_then_unchanged() {
        let temp = TempDir::new().unwrap();
        let projector = projector(Arc::new(NoopOwnership));

        let report = projector.materialize(&request(), temp.path(), None).await.unwrap();
        assert!(report.outcome.is_committed());
        assert!(report.is_complete());
        assert_eq!((report.files, report.bytes), (1, 5));

        let again = projector.refresh(&request(), temp.path(), None).await.unwrap();
        assert_eq!(again.outcome, WriteOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_ownership_failure_reports_commit() {
        let temp = TempDir::new().unwrap();
        let ownership = Arc::new(FailingOwnership(AtomicUsize::new(0)));
        let projector = projector(ownership.clone());

        let err = projector
            .materialize(&request(), temp.path(), Some(1234))
            .await
            .unwrap_err();
        match err {
            MaterializeError::Ownership { report, .. } => assert!(report.outcome.is_committed()),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(std::fs::read_to_string(temp.path().join("db/user")).unwrap(), "alice");
        assert_eq!(ownership.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ownership_failure_keeps_source_errors() {
        let temp = TempDir::new().unwrap();
        let projector = projector(Arc::new(FailingOwnership(AtomicUsize::new(0))));
        let request = request().with_source(SourceSpec::Config(ConfigProjection {
            name: "missing".to_string(),
            items: vec![],
        }));

        let err = projector
            .materialize(&request, temp.path(), Some(1234))
            .await
            .unwrap_err();
        let MaterializeError::Ownership { report, .. } = err else {
            panic!("expected ownership error");
        };
        assert_eq!(report.files, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_fatal_error_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("vol");
        let projector = projector(Arc::new(NoopOwnership));

        let err = projector
            .materialize(&request().with_default_mode(None), &target, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MaterializeError::Projection(ProjectionError::MissingDefaultMode { .. })
        ));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_tear_down() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("vol");
        let projector = projector(Arc::new(NoopOwnership));

        projector.materialize(&request(), &target, None).await.unwrap();
        projector.tear_down("creds", &target).await.unwrap();
        assert!(!target.exists());
    }
}
