// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Value objects, capability contracts and pure domain services for
//! projected volumes.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Projection model, field extraction and path rules

pub mod errors;
pub mod field_path;
pub mod lookup;
pub mod node_config;
pub mod ownership;
pub mod path_sanitizer;
pub mod projection;
pub mod quantity;
pub mod workload;
