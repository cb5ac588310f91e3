// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Projector Core
//!
//! Resolves secret, config and context-field sources into a single payload
//! and publishes it atomically into a projected volume directory.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Source resolution and atomic materialization engine

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
