// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use crate::constants::{chart::DEFAULT_NAMESPACE, lease};

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace holding the Chart resources this operator manages
    pub watch_namespace: String,
    /// Path of the desired-extensions YAML file
    pub extensions_config: PathBuf,
    /// When set, manifests are written here instead of applied to the cluster
    pub manifests_dir: Option<PathBuf>,
    pub helm_binary: PathBuf,
    pub helm_kubeconfig: Option<PathBuf>,
    pub helm_cache_dir: Option<PathBuf>,
    pub helm_repository_config: Option<PathBuf>,
    pub leader_election: bool,
    pub lease_name: String,
    pub lease_namespace: String,
    /// Identity recorded as lease holder
    pub pod_name: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let watch_namespace = var("WATCH_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let extensions_config = var("EXTENSIONS_CONFIG")
            .map(PathBuf::from)
            .context("EXTENSIONS_CONFIG environment variable not set")?;
        let leader_election = match var("LEADER_ELECTION") {
            Some(v) => v
                .parse()
                .with_context(|| format!("LEADER_ELECTION must be true or false, got {}", v))?,
            None => true,
        };
        let pod_name = var("POD_NAME")
            .or_else(|| var("HOSTNAME"))
            .context("neither POD_NAME nor HOSTNAME is set")?;

        Ok(Config {
            lease_namespace: var("LEASE_NAMESPACE").unwrap_or_else(|| watch_namespace.clone()),
            watch_namespace,
            extensions_config,
            manifests_dir: var("MANIFESTS_DIR").map(PathBuf::from),
            helm_binary: var("HELM_BINARY").unwrap_or_else(|| "helm".to_string()).into(),
            helm_kubeconfig: var("HELM_KUBECONFIG").map(PathBuf::from),
            helm_cache_dir: var("HELM_CACHE_DIR").map(PathBuf::from),
            helm_repository_config: var("HELM_REPOSITORY_CONFIG").map(PathBuf::from),
            leader_election,
            lease_name: var("LEASE_NAME").unwrap_or_else(|| lease::DEFAULT_NAME.to_string()),
            pod_name,
        })
    }
}
