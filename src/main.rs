// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chart_operator::config::Config;
use chart_operator::constants::sync::CONFIG_POLL_INTERVAL_SECS;
use chart_operator::helm::HelmCli;
use chart_operator::leader::{AlwaysLeader, LeaderElector, LeaseLeaderElector};
use chart_operator::reconcilers::ChartReconciler;
use chart_operator::sync::{
    ApplyManifestSaver, ConfigWatcher, ExtensionsSynchronizer, FileManifestSaver, ManifestSaver,
    SyncManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting chart operator");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: watch_namespace={}, extensions_config={}",
        config.watch_namespace,
        config.extensions_config.display()
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let leader: Arc<dyn LeaderElector> = if config.leader_election {
        let elector = Arc::new(LeaseLeaderElector::new(
            client.clone(),
            &config.lease_name,
            &config.lease_namespace,
            &config.pod_name,
        ));
        let token = cancel.clone();
        let runner = elector.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run(token).await {
                warn!("Leader election stopped: {:?}", e);
            }
        });
        elector
    } else {
        info!("Leader election disabled, acting as leader");
        Arc::new(AlwaysLeader)
    };

    let helm = Arc::new(
        HelmCli::new(&config.helm_binary)
            .with_kubeconfig(config.helm_kubeconfig.clone())
            .with_repository_paths(config.helm_cache_dir.clone(), config.helm_repository_config.clone()),
    );

    let saver: Arc<dyn ManifestSaver> = match &config.manifests_dir {
        Some(dir) => {
            info!("Saving chart manifests to {}", dir.display());
            Arc::new(FileManifestSaver::new(dir))
        }
        None => Arc::new(ApplyManifestSaver::new(client.clone())),
    };

    let synchronizer =
        ExtensionsSynchronizer::new(helm.clone(), saver).with_namespace(&config.watch_namespace);
    let (sync_manager, sync_handle) = SyncManager::new(synchronizer);
    let config_watcher = ConfigWatcher::new(
        &config.extensions_config,
        Duration::from_secs(CONFIG_POLL_INTERVAL_SECS),
        sync_handle,
    );
    let chart_reconciler = ChartReconciler::new(client, &config.watch_namespace, helm, leader);

    info!("Starting reconcilers...");

    tokio::try_join!(
        sync_manager.run(cancel.clone()),
        config_watcher.run(cancel.clone()),
        chart_reconciler.run(cancel.clone())
    )?;

    info!("Chart operator stopped");
    Ok(())
}

/// Cancel the shared token on SIGINT or SIGTERM
async fn shutdown_on_signal(cancel: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
        _ = terminate.recv() => info!("Received SIGTERM, shutting down"),
    }
    cancel.cancel();
}
