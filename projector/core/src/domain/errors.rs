// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Projection Error Taxonomy
//!
//! Two classes of failure:
//!
//! - **Fatal** (`MissingDefaultMode`, `StoreUnavailable`, `ConflictingPaths`)
//!   abort an aggregation before any source is resolved.
//! - **Recorded** (everything else) are collected per source or per item into
//!   an [`AggregateError`] returned next to a best-effort result.

use crate::domain::field_path::FieldError;
use crate::domain::lookup::{LookupError, ObjectKind};
use crate::domain::path_sanitizer::PathSanitizerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("volume {volume}: no default mode set, not even the default value for it")]
    MissingDefaultMode { volume: String },

    #[error("volume {volume}: object store is not configured")]
    StoreUnavailable { volume: String },

    #[error("path {path} is declared by both source #{first} and source #{second}")]
    ConflictingPaths {
        path: String,
        first: usize,
        second: usize,
    },

    #[error("couldn't get {kind} {namespace}/{name}: {source}")]
    SourceFetch {
        kind: ObjectKind,
        namespace: String,
        name: String,
        #[source]
        source: LookupError,
    },

    #[error("{kind} {namespace}/{name} has no key {key}")]
    MissingKey {
        kind: ObjectKind,
        namespace: String,
        name: String,
        key: String,
    },

    #[error("unable to extract field for {path}: {source}")]
    FieldExtraction {
        path: String,
        #[source]
        source: FieldError,
    },

    #[error("unable to read node allocatable resources for {path}: {source}")]
    AllocatableLookup {
        path: String,
        #[source]
        source: LookupError,
    },

    #[error("invalid output path from source #{source_index}: {source}")]
    InvalidPath {
        source_index: usize,
        #[source]
        source: PathSanitizerError,
    },

    #[error("path {path} from source #{source_index} collides and cannot be disambiguated")]
    PathCollision { path: String, source_index: usize },
}

impl ProjectionError {
    /// Fatal errors abort aggregation; the rest are recorded
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingDefaultMode { .. }
                | Self::StoreUnavailable { .. }
                | Self::ConflictingPaths { .. }
        )
    }
}

/// A collection of independent, non-fatal errors
#[derive(Debug, Default)]
pub struct AggregateError(Vec<ProjectionError>);

impl AggregateError {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: ProjectionError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: AggregateError) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectionError> {
        self.0.iter()
    }

    /// `Ok(())` when empty, otherwise the aggregate itself
    pub fn into_result(self) -> Result<(), AggregateError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [only] => write!(f, "{}", only),
            many => {
                write!(f, "[")?;
                for (i, err) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl std::error::Error for AggregateError {}

impl From<Vec<ProjectionError>> for AggregateError {
    fn from(errors: Vec<ProjectionError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for AggregateError {
    type Item = ProjectionError;
    type IntoIter = std::vec::IntoIter<ProjectionError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A best-effort value paired with the errors met while producing it
#[derive(Debug)]
pub struct Partial<T> {
    pub value: T,
    pub errors: AggregateError,
}

impl<T> Partial<T> {
    pub fn new(value: T, errors: AggregateError) -> Self {
        Self { value, errors }
    }

    pub fn complete(value: T) -> Self {
        Self::new(value, AggregateError::new())
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Treat any recorded error as failure
    pub fn into_strict(self) -> Result<T, AggregateError> {
        self.errors.into_result().map(|_| self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_config(name: &str) -> ProjectionError {
        ProjectionError::SourceFetch {
            kind: ObjectKind::Config,
            namespace: "default".to_string(),
            name: name.to_string(),
            source: LookupError::not_found(ObjectKind::Config, "default", name),
        }
    }

    #[test]
    fn test_aggregate_display() {
        let mut errors = AggregateError::new();
        assert_eq!(errors.to_string(), "");

        errors.push(missing_config("app"));
        assert_eq!(
            errors.to_string(),
            "couldn't get config default/app: config default/app not found"
        );

        errors.push(missing_config("db"));
        let text = errors.to_string();
        assert!(text.starts_with('['));
        assert!(text.contains("default/app"));
        assert!(text.contains("default/db"));
    }

    #[test]
    fn test_partial_strict() {
        let ok = Partial::complete(3);
        assert!(ok.is_complete());
        assert_eq!(ok.into_strict().unwrap(), 3);

        let partial = Partial::new(3, AggregateError::from(vec![missing_config("app")]));
        assert_eq!(partial.into_strict().unwrap_err().len(), 1);
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ProjectionError::MissingDefaultMode { volume: "v".into() }.is_fatal());
        assert!(!missing_config("app").is_fatal());
    }
}
