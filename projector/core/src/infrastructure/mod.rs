// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod atomic_writer;
pub mod manifest_parser;
pub mod ownership;
pub mod store;

pub use atomic_writer::{AtomicWriter, WriteError, WriteOutcome};
pub use manifest_parser::{ManifestParser, ProjectedVolumeManifest};
pub use ownership::FsGroupOwnership;
