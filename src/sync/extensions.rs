// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Translates the desired-extensions configuration into repository registrations
//! and one Chart manifest per configured chart.
//!
//! The synchronizer never installs releases itself; the chart reconciler picks up
//! the rendered Chart records.

use kube::api::ObjectMeta;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::constants::chart::{DEFAULT_NAMESPACE, FINALIZER, MANIFEST_PREFIX, RESOURCE_PREFIX};
use crate::constants::openebs;
use crate::error::{OperatorError, Result};
use crate::helm::PackageManager;
use crate::sync::saver::ManifestSaver;
use crate::types::{Chart, ChartSettings, ChartSpec, ExtensionsConfig, HelmExtensions, Repository};

pub struct ExtensionsSynchronizer {
    package_manager: Arc<dyn PackageManager>,
    saver: Arc<dyn ManifestSaver>,
    namespace: String,
}

impl ExtensionsSynchronizer {
    pub fn new(package_manager: Arc<dyn PackageManager>, saver: Arc<dyn ManifestSaver>) -> Self {
        Self {
            package_manager,
            saver,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Namespace the Chart records are rendered into
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Register repositories and persist a Chart manifest for every configured chart.
    ///
    /// The first failure aborts the pass. Repositories already added and manifests
    /// already saved stay in place.
    #[instrument(skip(self, config))]
    pub async fn synchronize(&self, config: &ExtensionsConfig) -> Result<()> {
        info!("Extensions reconciliation started");

        let config = with_storage_provisioner(config);
        let Some(helm) = config.helm.as_ref() else {
            info!("No helm extensions configured");
            return Ok(());
        };

        let result = self.sync_helm(helm).await;
        match &result {
            Ok(()) => info!(
                "Extensions reconciliation finished: {} repositories, {} charts",
                helm.repositories.len(),
                helm.charts.len()
            ),
            Err(e) => error!("Extensions reconciliation failed: {}", e),
        }
        result
    }

    async fn sync_helm(&self, helm: &HelmExtensions) -> Result<()> {
        for repo in &helm.repositories {
            self.package_manager
                .add_repository(repo)
                .await
                .map_err(|e| OperatorError::RepositoryAdd {
                    url: repo.url.clone(),
                    source: Box::new(e),
                })?;
        }

        for chart in &helm.charts {
            let manifest = render_chart_manifest(chart, &self.namespace)?;
            self.saver
                .save(&manifest_filename(chart), &manifest)
                .await
                .map_err(|e| OperatorError::ManifestSave {
                    chart: chart.name.clone(),
                    source: Box::new(e),
                })?;
        }

        Ok(())
    }
}

/// Add the built-in storage provisioner when the storage backend needs it.
///
/// Returns a new config and leaves the input untouched. Entries whose name is
/// already declared are not added again, so applying this to its own output is a
/// no-op.
pub fn with_storage_provisioner(config: &ExtensionsConfig) -> ExtensionsConfig {
    let mut config = config.clone();
    if !config.storage.storage_type.requires_provisioner() {
        return config;
    }

    let helm = config.helm.get_or_insert_with(HelmExtensions::default);
    if !helm.repositories.iter().any(|r| r.name == openebs::REPOSITORY_NAME) {
        helm.repositories.push(Repository {
            name: openebs::REPOSITORY_NAME.to_string(),
            url: openebs::REPOSITORY_URL.to_string(),
            ..Default::default()
        });
    }
    if !helm.charts.iter().any(|c| c.name == openebs::CHART_NAME) {
        helm.charts.push(ChartSettings {
            name: openebs::CHART_NAME.to_string(),
            chart_name: openebs::CHART_REF.to_string(),
            version: openebs::CHART_VERSION.to_string(),
            namespace: openebs::TARGET_NAMESPACE.to_string(),
            ..Default::default()
        });
    }
    config
}

pub fn manifest_filename(chart: &ChartSettings) -> String {
    format!("{}{}.yaml", MANIFEST_PREFIX, chart.name)
}

/// Render the Chart record for a configured chart, carrying our finalizer
pub fn render_chart_manifest(chart: &ChartSettings, namespace: &str) -> Result<Vec<u8>> {
    let record = Chart {
        metadata: ObjectMeta {
            name: Some(format!("{}{}", RESOURCE_PREFIX, chart.name)),
            namespace: Some(namespace.to_string()),
            finalizers: Some(vec![FINALIZER.to_string()]),
            ..Default::default()
        },
        spec: ChartSpec {
            chart_name: chart.chart_name.clone(),
            release_name: Some(chart.name.clone()),
            version: chart.version.clone(),
            namespace: chart.namespace.clone(),
            values: chart.values.clone(),
            timeout: chart.timeout.clone(),
        },
        status: None,
    };

    serde_yaml::to_string(&record)
        .map(String::into_bytes)
        .map_err(|source| OperatorError::ManifestRender {
            chart: chart.name.clone(),
            source,
        })
}
