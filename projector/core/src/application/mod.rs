// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod source_resolver;
pub mod aggregator;
pub mod volume_projector;

pub use aggregator::PayloadAggregator;
pub use source_resolver::SourceResolver;
pub use volume_projector::{MaterializeError, MaterializeReport, VolumeProjector};
