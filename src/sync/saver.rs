// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Persistence of rendered Chart manifests.

use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::constants::OPERATOR_NAME;
use crate::error::{OperatorError, Result};
use crate::types::Chart;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestSaver: Send + Sync {
    async fn save(&self, filename: &str, contents: &[u8]) -> Result<()>;
}

/// Writes manifests into a directory picked up by an external manifest applier
#[derive(Debug, Clone)]
pub struct FileManifestSaver {
    dir: PathBuf,
}

impl FileManifestSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ManifestSaver for FileManifestSaver {
    #[instrument(skip(self, contents))]
    async fn save(&self, filename: &str, contents: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so appliers never observe a partial manifest
        let target = self.dir.join(filename);
        let staging = self.dir.join(format!(".{}.tmp", filename));
        tokio::fs::write(&staging, contents).await?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                warn!("Failed to remove staging file {}: {}", staging.display(), cleanup);
            }
            return Err(e.into());
        }

        debug!("Saved manifest {}", target.display());
        Ok(())
    }
}

/// Server-side applies the rendered Chart directly
#[derive(Clone)]
pub struct ApplyManifestSaver {
    client: Client,
}

impl ApplyManifestSaver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestSaver for ApplyManifestSaver {
    #[instrument(skip(self, contents))]
    async fn save(&self, filename: &str, contents: &[u8]) -> Result<()> {
        let chart: Chart = serde_yaml::from_slice(contents)?;
        let namespace = chart.namespace().ok_or_else(|| {
            OperatorError::InvalidConfig(format!("manifest {} has no namespace", filename))
        })?;
        let name = chart.name_any();

        let charts: Api<Chart> = Api::namespaced(self.client.clone(), &namespace);
        let pp = PatchParams::apply(OPERATOR_NAME).force();
        charts.patch(&name, &pp, &Patch::Apply(&chart)).await?;

        info!("Applied chart {}/{}", namespace, name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{chart_json, MockService};

    #[tokio::test]
    async fn test_file_saver_creates_dir_and_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("manifests").join("helm");
        let saver = FileManifestSaver::new(&dir);

        saver.save("addon_crd_manifest_foo.yaml", b"kind: Chart\n").await.unwrap();

        let written = std::fs::read_to_string(dir.join("addon_crd_manifest_foo.yaml")).unwrap();
        assert_eq!(written, "kind: Chart\n");
        assert!(!dir.join(".addon_crd_manifest_foo.yaml.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_saver_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let saver = FileManifestSaver::new(tmp.path());

        saver.save("m.yaml", b"first").await.unwrap();
        saver.save("m.yaml", b"second").await.unwrap();

        assert_eq!(std::fs::read_to_string(tmp.path().join("m.yaml")).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_file_saver_cleans_up_after_failed_rename() {
        let tmp = tempfile::tempdir().unwrap();
        // A non-empty directory in the way makes the rename fail
        let blocker = tmp.path().join("m.yaml");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();
        let saver = FileManifestSaver::new(tmp.path());

        let result = saver.save("m.yaml", b"contents").await;

        assert!(matches!(result, Err(OperatorError::Io(_))));
        assert!(!tmp.path().join(".m.yaml.tmp").exists());
    }

    #[tokio::test]
    async fn test_apply_saver_patches_chart() {
        let client = MockService::new()
            .on_patch(
                "/apis/helm.chart-operator.io/v1beta1/namespaces/kube-system/charts/extension-chart-foo",
                200,
                &chart_json("extension-chart-foo", "kube-system"),
            )
            .into_client();
        let saver = ApplyManifestSaver::new(client);
        let manifest = serde_yaml::to_string(
            &serde_json::from_str::<serde_json::Value>(&chart_json("extension-chart-foo", "kube-system"))
                .unwrap(),
        )
        .unwrap();

        saver.save("addon_crd_manifest_foo.yaml", manifest.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_saver_rejects_manifest_without_namespace() {
        let saver = ApplyManifestSaver::new(MockService::new().into_client());
        let manifest = r#"
apiVersion: helm.chart-operator.io/v1beta1
kind: Chart
metadata:
  name: extension-chart-foo
spec:
  chartName: repo/foo
  version: 1.0.0
  namespace: ns1
"#;

        let result = saver.save("addon_crd_manifest_foo.yaml", manifest.as_bytes()).await;
        assert!(matches!(result, Err(OperatorError::InvalidConfig(_))));
    }
}
