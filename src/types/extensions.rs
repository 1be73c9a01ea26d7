// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Desired-extensions configuration: Helm repositories, charts and storage backend.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{OperatorError, Result};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmExtensions>,
    #[serde(default)]
    pub storage: StorageExtension,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmExtensions {
    #[serde(default)]
    pub repositories: Vec<Repository>,
    #[serde(default)]
    pub charts: Vec<ChartSettings>,
}

/// A Helm chart repository with optional authentication
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
}

/// A chart to be installed, mapping to one Chart resource
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartSettings {
    /// Release name, also used to derive the Chart resource and manifest names
    pub name: String,
    pub chart_name: String,
    pub version: String,
    /// Target namespace
    pub namespace: String,
    #[serde(default)]
    pub values: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StorageExtension {
    #[serde(default, rename = "type")]
    pub storage_type: StorageType,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    #[default]
    ExternalStorage,
    OpenebsLocalStorage,
}

impl StorageType {
    /// Whether this backend needs the built-in provisioner chart
    pub fn requires_provisioner(&self) -> bool {
        matches!(self, StorageType::OpenebsLocalStorage)
    }
}

impl ExtensionsConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ExtensionsConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check repository URLs and chart name uniqueness
    pub fn validate(&self) -> Result<()> {
        let Some(helm) = &self.helm else {
            return Ok(());
        };

        for repo in &helm.repositories {
            if repo.name.is_empty() {
                return Err(OperatorError::InvalidConfig(format!(
                    "repository with URL `{}` has no name",
                    repo.url
                )));
            }
            url::Url::parse(&repo.url).map_err(|e| {
                OperatorError::InvalidConfig(format!(
                    "repository `{}` has invalid URL `{}`: {}",
                    repo.name, repo.url, e
                ))
            })?;
        }

        let mut seen = HashSet::new();
        for chart in &helm.charts {
            if chart.name.is_empty() {
                return Err(OperatorError::InvalidConfig(format!(
                    "chart `{}` has no name",
                    chart.chart_name
                )));
            }
            if !seen.insert(chart.name.as_str()) {
                return Err(OperatorError::InvalidConfig(format!(
                    "chart name `{}` is declared more than once",
                    chart.name
                )));
            }
        }

        Ok(())
    }
}
