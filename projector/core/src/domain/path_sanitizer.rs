// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Cleans and validates the relative output paths of projected files. Paths
//! come from user declarations and from raw object keys, so they are
//! untrusted until they pass through here.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Output path normalization and traversal prevention

use thiserror::Error;

/// Maximum length of a single path segment
pub const MAX_SEGMENT_LEN: usize = 255;

/// Names starting with this prefix are reserved for the writer's own entries
pub const RESERVED_PREFIX: &str = "..";

/// Path sanitization errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathSanitizerError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path must be relative: {0}")]
    AbsolutePath(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),

    #[error("Path segment longer than {MAX_SEGMENT_LEN} bytes: {0}")]
    SegmentTooLong(String),

    #[error("Path may not start with '{RESERVED_PREFIX}': {0}")]
    ReservedPrefix(String),
}

/// Path sanitizer domain service
///
/// # Guarantees
/// - Output paths are relative and free of `..` components
/// - Redundant separators and `.` components are removed
/// - Paths never start with `..`, which the atomic writer reserves
pub struct PathSanitizer {
    /// Maximum allowed path length (default: 4096)
    max_path_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self { max_path_len: 4096 }
    }

    pub fn with_max_length(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Clean and validate a relative output path
    ///
    /// # Examples
    /// ```
    /// use projector_core::domain::path_sanitizer::PathSanitizer;
    ///
    /// let sanitizer = PathSanitizer::new();
    /// assert_eq!(sanitizer.canonicalize("db//./user").unwrap(), "db/user");
    /// assert!(sanitizer.canonicalize("../etc/passwd").is_err());
    /// ```
    pub fn canonicalize(&self, path: &str) -> Result<String, PathSanitizerError> {
        if path.split('/').any(|segment| segment == "..") {
            tracing::warn!(path = %path, "Path traversal attempt detected: contains '..' component");
            return Err(PathSanitizerError::PathTraversal(path.to_string()));
        }

        let cleaned = clean(path);
        self.validate(&cleaned)?;
        Ok(cleaned)
    }

    /// Validate an already-clean relative path
    pub fn validate(&self, path: &str) -> Result<(), PathSanitizerError> {
        if path.is_empty() || path == "." {
            return Err(PathSanitizerError::InvalidPath("path is empty".to_string()));
        }

        if path.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(path.to_string()));
        }

        if path.contains('\0') {
            tracing::warn!(path = %path, "Path contains null byte");
            return Err(PathSanitizerError::InvalidPath(
                "Path contains null byte".to_string(),
            ));
        }

        if path.starts_with('/') {
            return Err(PathSanitizerError::AbsolutePath(path.to_string()));
        }

        for segment in path.split('/') {
            if segment == ".." {
                return Err(PathSanitizerError::PathTraversal(path.to_string()));
            }
            if segment.len() > MAX_SEGMENT_LEN {
                return Err(PathSanitizerError::SegmentTooLong(path.to_string()));
            }
        }

        if path.starts_with(RESERVED_PREFIX) {
            return Err(PathSanitizerError::ReservedPrefix(path.to_string()));
        }

        Ok(())
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexically clean a slash-separated path: drop empty and `.` segments.
///
/// A leading `/` is preserved so absolute paths stay detectable.
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    match (rooted, segments.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", segments.join("/")),
        (false, true) => ".".to_string(),
        (false, false) => segments.join("/"),
    }
}

/// First segment of a clean relative path (`db/user` → `db`)
pub fn top_level(path: &str) -> &str {
    path.split('/').next().unwrap_or(path)
}
