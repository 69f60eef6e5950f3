/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-context/src/lib.rs
 *
 * Cluster-context manager crate (C3). See `manager::ClusterContextManager`.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

pub mod manager;
pub mod profile;

pub use manager::{ClusterContextManager, ContextError};
pub use profile::{ClusterProfile, ProfileFile, ProfileLoadError};
