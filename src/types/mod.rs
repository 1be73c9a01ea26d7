// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource and configuration types.

pub mod chart;
pub mod extensions;

pub use chart::{Chart, ChartSpec, ChartStatus};
pub use extensions::{
    ChartSettings, ExtensionsConfig, HelmExtensions, Repository, StorageExtension, StorageType,
};
