// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Package manager backed by the `helm` binary.

use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::{OperatorError, Result};
use crate::helm::{InstallRequest, PackageManager, ReleaseInfo, UpgradeRequest};
use crate::types::Repository;

/// Runs helm commands against the cluster
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
    repository_cache: Option<PathBuf>,
    repository_config: Option<PathBuf>,
}

/// Subset of the release document printed by `helm install/upgrade -o json`
#[derive(Deserialize, Debug)]
struct HelmRelease {
    name: String,
    namespace: String,
    version: i64,
    chart: HelmReleaseChart,
}

#[derive(Deserialize, Debug)]
struct HelmReleaseChart {
    metadata: HelmChartMetadata,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct HelmChartMetadata {
    version: String,
    #[serde(default)]
    app_version: Option<String>,
}

impl From<HelmRelease> for ReleaseInfo {
    fn from(release: HelmRelease) -> Self {
        ReleaseInfo {
            name: release.name,
            namespace: release.namespace,
            revision: release.version,
            chart_version: release.chart.metadata.version,
            app_version: release.chart.metadata.app_version.unwrap_or_default(),
        }
    }
}

impl HelmCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: None,
            repository_cache: None,
            repository_config: None,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    pub fn with_repository_paths(
        mut self,
        cache: Option<PathBuf>,
        config: Option<PathBuf>,
    ) -> Self {
        self.repository_cache = cache;
        self.repository_config = config;
        self
    }

    /// Flags shared by every helm invocation
    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        if let Some(cache) = &self.repository_cache {
            args.push("--repository-cache".to_string());
            args.push(cache.display().to_string());
        }
        if let Some(config) = &self.repository_config {
            args.push("--repository-config".to_string());
            args.push(config.display().to_string());
        }
        args
    }

    async fn run(&self, args: Vec<String>, stdin: Option<&str>) -> Result<String> {
        debug!("Running {} {}", self.binary.display(), args.join(" "));

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.global_args())
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            OperatorError::Helm(format!("failed to spawn {}: {}", self.binary.display(), e))
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(OperatorError::Helm(format!(
                "`helm {}` exited with {:?}: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                output.status.code(),
                stderr.trim()
            )))
        }
    }
}

fn repo_add_args(repo: &Repository) -> Vec<String> {
    let mut args = vec![
        "repo".to_string(),
        "add".to_string(),
        repo.name.clone(),
        repo.url.clone(),
        "--force-update".to_string(),
    ];
    if let Some(username) = &repo.username {
        args.push("--username".to_string());
        args.push(username.clone());
    }
    if repo.password.is_some() {
        args.push("--password-stdin".to_string());
    }
    if let Some(ca_file) = &repo.ca_file {
        args.push("--ca-file".to_string());
        args.push(ca_file.clone());
    }
    if let Some(cert_file) = &repo.cert_file {
        args.push("--cert-file".to_string());
        args.push(cert_file.clone());
    }
    if let Some(key_file) = &repo.key_file {
        args.push("--key-file".to_string());
        args.push(key_file.clone());
    }
    if repo.insecure == Some(true) {
        args.push("--insecure-skip-tls-verify".to_string());
    }
    args
}

fn release_args(
    verb: &str,
    release_name: &str,
    chart_ref: &str,
    version: &str,
    namespace: &str,
    values_file: &str,
    timeout: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        verb.to_string(),
        release_name.to_string(),
        chart_ref.to_string(),
        "--version".to_string(),
        version.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--create-namespace".to_string(),
        "--values".to_string(),
        values_file.to_string(),
        "--output".to_string(),
        "json".to_string(),
    ];
    if let Some(timeout) = timeout {
        args.push("--timeout".to_string());
        args.push(timeout.to_string());
    }
    args
}

/// `upgrade --install`, so installing a release that already exists converges
/// instead of failing on the name being in use
fn install_args(request: &InstallRequest, values_file: &str) -> Vec<String> {
    let mut args = release_args(
        "upgrade",
        &request.release_name,
        &request.chart_ref,
        &request.version,
        &request.namespace,
        values_file,
        request.timeout.as_deref(),
    );
    args.push("--install".to_string());
    args
}

fn write_values(values: &serde_yaml::Value) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("chart-values-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(serde_yaml::to_string(values)?.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn parse_release(output: &str) -> Result<ReleaseInfo> {
    let release: HelmRelease = serde_json::from_str(output)
        .map_err(|e| OperatorError::Helm(format!("can't parse helm release output: {}", e)))?;
    Ok(release.into())
}

/// Helm reports a missing release as `Release not loaded: <name>: release: not found`.
/// Other "not found" failures, such as a missing resource mapping, leave the release behind.
fn is_release_not_found(err: &OperatorError) -> bool {
    matches!(err, OperatorError::Helm(msg)
        if msg.contains("Release not loaded") || msg.contains("release: not found"))
}

#[async_trait]
impl PackageManager for HelmCli {
    #[instrument(skip(self, repo), fields(repository = %repo.name))]
    async fn add_repository(&self, repo: &Repository) -> Result<()> {
        self.run(repo_add_args(repo), repo.password.as_deref()).await?;
        info!("Repository {} ({}) added", repo.name, repo.url);
        Ok(())
    }

    #[instrument(skip(self, request), fields(release = %request.release_name))]
    async fn install(&self, request: &InstallRequest) -> Result<ReleaseInfo> {
        let values = write_values(&request.values)?;
        let args = install_args(request, &values.path().display().to_string());
        let release = parse_release(&self.run(args, None).await?)?;
        info!(
            "Installed {} {} as {}/{} (revision {})",
            request.chart_ref, release.chart_version, release.namespace, release.name, release.revision
        );
        Ok(release)
    }

    #[instrument(skip(self, request), fields(release = %request.release_name))]
    async fn upgrade(&self, request: &UpgradeRequest) -> Result<ReleaseInfo> {
        let values = write_values(&request.values)?;
        let args = release_args(
            "upgrade",
            &request.release_name,
            &request.chart_ref,
            &request.target_version,
            &request.namespace,
            &values.path().display().to_string(),
            request.timeout.as_deref(),
        );
        let release = parse_release(&self.run(args, None).await?)?;
        info!(
            "Upgraded {}/{} from {} to {} (revision {})",
            release.namespace,
            release.name,
            request.current_version,
            release.chart_version,
            release.revision
        );
        Ok(release)
    }

    #[instrument(skip(self))]
    async fn uninstall(&self, release_name: &str, namespace: &str) -> Result<()> {
        let args = vec![
            "uninstall".to_string(),
            release_name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        match self.run(args, None).await {
            Ok(_) => {
                info!("Uninstalled {}/{}", namespace, release_name);
                Ok(())
            }
            Err(e) if is_release_not_found(&e) => {
                warn!("Release {}/{} already gone: {}", namespace, release_name, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
