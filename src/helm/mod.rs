// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Package manager capability used by the synchronizer and the chart reconciler.

pub mod cli;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::types::Repository;

pub use cli::HelmCli;

/// Release as reported by the package manager after install or upgrade
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub revision: i64,
    pub chart_version: String,
    pub app_version: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallRequest {
    pub release_name: String,
    pub chart_ref: String,
    pub version: String,
    pub namespace: String,
    pub values: serde_yaml::Value,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeRequest {
    pub release_name: String,
    pub chart_ref: String,
    /// Version currently installed, as recorded in status
    pub current_version: String,
    /// Version requested by the spec
    pub target_version: String,
    pub namespace: String,
    pub values: serde_yaml::Value,
    pub timeout: Option<String>,
}

/// Idempotent package manager operations.
///
/// Calls are treated as atomic: once invoked, callers wait for the terminal result.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Register (or refresh) a chart repository
    async fn add_repository(&self, repo: &Repository) -> Result<()>;

    async fn install(&self, request: &InstallRequest) -> Result<ReleaseInfo>;

    async fn upgrade(&self, request: &UpgradeRequest) -> Result<ReleaseInfo>;

    /// Remove a release; a release that no longer exists counts as removed
    async fn uninstall(&self, release_name: &str, namespace: &str) -> Result<()>;
}
