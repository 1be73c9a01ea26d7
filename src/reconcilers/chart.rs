// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Chart reconciler - converges Helm releases against Chart resources.
//!
//! Each attempt re-reads the record, then either uninstalls (deletion marker set),
//! installs (no release recorded yet) or upgrades (release recorded). Only the
//! elected leader mutates releases or status. Failures are returned to the
//! controller, which requeues the record; the next attempt starts from scratch.
//!
//! The controller runs at most one reconciliation per record at a time, which
//! this module relies on.

use crate::constants::chart::{FINALIZER, GROUP, KIND, VERSION};
use crate::constants::reconcile::{REQUEUE_NOT_LEADER_SECS, REQUEUE_ON_ERROR_SECS};
use crate::error::{OperatorError, Result};
use crate::helm::{InstallRequest, PackageManager, ReleaseInfo, UpgradeRequest};
use crate::kubernetes::crd::{wait_for_crd, CrdBackoff, KindResolver};
use crate::kubernetes::{ChartStore, DiscoveryKindResolver, KubeChartStore};
use crate::leader::LeaderElector;
use crate::types::{Chart, ChartStatus};
use chrono::Utc;
use futures::StreamExt;
use kube::{
    api::GroupVersionKind,
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Collaborators shared by all reconciliation attempts
pub struct Context {
    pub store: Arc<dyn ChartStore>,
    pub package_manager: Arc<dyn PackageManager>,
    pub leader: Arc<dyn LeaderElector>,
}

/// What a single reconciliation attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NotLeader,
    /// The record no longer exists
    Gone,
    /// The current generation was already converged
    UpToDate,
    Installed { release: String },
    Upgraded { release: String },
    /// Cleanup ran and the finalizer was removed
    Uninstalled,
    /// Marked for deletion but our finalizer is not present
    NothingToClean,
}

pub struct ChartReconciler {
    client: Client,
    namespace: String,
    context: Arc<Context>,
    resolver: Arc<dyn KindResolver>,
    crd_backoff: CrdBackoff,
}

pub fn chart_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(GROUP, VERSION, KIND)
}

impl ChartReconciler {
    pub fn new(
        client: Client,
        namespace: &str,
        package_manager: Arc<dyn PackageManager>,
        leader: Arc<dyn LeaderElector>,
    ) -> Self {
        let context = Context {
            store: Arc::new(KubeChartStore::new(client.clone(), namespace)),
            package_manager,
            leader,
        };
        Self {
            resolver: Arc::new(DiscoveryKindResolver::new(client.clone())),
            client,
            namespace: namespace.to_string(),
            context: Arc::new(context),
            crd_backoff: CrdBackoff::default(),
        }
    }

    pub fn with_crd_backoff(mut self, backoff: CrdBackoff) -> Self {
        self.crd_backoff = backoff;
        self
    }

    /// Wait for the Chart CRD, then watch Charts in the configured namespace until cancelled
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        info!("Waiting for Chart CRD to become available...");
        let Self {
            client,
            namespace,
            context,
            resolver,
            crd_backoff,
        } = self;

        let shutdown = cancel.clone();
        after_crd_ready(resolver.as_ref(), &crd_backoff, &cancel, || async move {
            info!("Watching Charts in namespace {}", namespace);
            let charts: Api<Chart> = Api::namespaced(client, &namespace);

            Controller::new(charts, WatcherConfig::default())
                .graceful_shutdown_on(async move { shutdown.cancelled().await })
                .run(reconcile, error_policy, context)
                .for_each(|res| async move {
                    match res {
                        Ok(o) => debug!("Reconciled chart: {:?}", o),
                        Err(e) => warn!("Reconciliation error: {:?}", e),
                    }
                })
                .await;
        })
        .await?;

        info!("Chart reconciler stopped");
        Ok(())
    }
}

/// Run `start` once the Chart kind resolves; never before, and not at all when cancelled
pub async fn after_crd_ready<F, Fut>(
    resolver: &dyn KindResolver,
    backoff: &CrdBackoff,
    cancel: &CancellationToken,
    start: F,
) -> Result<Fut::Output>
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    wait_for_crd(resolver, &chart_gvk(), backoff, cancel).await?;
    Ok(start().await)
}

#[instrument(skip(chart, ctx), fields(chart = %chart.key()))]
async fn reconcile(chart: Arc<Chart>, ctx: Arc<Context>) -> Result<Action> {
    let outcome = reconcile_chart(&chart.name_any(), &ctx).await?;
    debug!("Reconciliation outcome: {:?}", outcome);
    Ok(match outcome {
        // Revisit once this replica may have become leader
        Outcome::NotLeader => Action::requeue(Duration::from_secs(REQUEUE_NOT_LEADER_SECS)),
        _ => Action::await_change(),
    })
}

fn error_policy(chart: Arc<Chart>, error: &OperatorError, _ctx: Arc<Context>) -> Action {
    error!(chart = %chart.key(), "Reconciliation error: {}", error);
    Action::requeue(Duration::from_secs(REQUEUE_ON_ERROR_SECS))
}

/// One reconciliation attempt for the chart called `name`
pub async fn reconcile_chart(name: &str, ctx: &Context) -> Result<Outcome> {
    if !ctx.leader.is_leader() {
        debug!("Not the leader, skipping chart {}", name);
        return Ok(Outcome::NotLeader);
    }

    let Some(chart) = ctx.store.get(name).await? else {
        debug!("Chart {} is gone", name);
        return Ok(Outcome::Gone);
    };

    if chart.is_being_deleted() {
        debug!("Uninstall reconciliation request: {}", chart.key());
        return uninstall(chart, ctx).await;
    }

    if !chart.needs_reconcile() {
        debug!("Chart {} generation already converged", chart.key());
        return Ok(Outcome::UpToDate);
    }

    debug!("Install or upgrade reconciliation request: {}", chart.key());
    let chart = ensure_finalizer(chart, ctx).await?;
    install_or_upgrade(chart, ctx).await
}

async fn ensure_finalizer(chart: Chart, ctx: &Context) -> Result<Chart> {
    if chart.has_finalizer() {
        return Ok(chart);
    }

    info!("Adding finalizer to chart {}", chart.key());
    let mut finalizers = chart.finalizers().to_vec();
    finalizers.push(FINALIZER.to_string());
    ctx.store.set_finalizers(&chart, finalizers).await
}

async fn uninstall(chart: Chart, ctx: &Context) -> Result<Outcome> {
    if !chart.has_finalizer() {
        return Ok(Outcome::NothingToClean);
    }

    match chart.release_name() {
        Some(release) => {
            let namespace = chart
                .status
                .as_ref()
                .map(|s| s.namespace.clone())
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| chart.spec.namespace.clone());

            ctx.package_manager
                .uninstall(release, &namespace)
                .await
                .map_err(|e| OperatorError::Uninstall {
                    chart: chart.name_any(),
                    release: release.to_string(),
                    namespace: namespace.clone(),
                    source: Box::new(e),
                })?;
        }
        None => info!("Chart {} was never installed, nothing to uninstall", chart.key()),
    }

    let finalizers = chart
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != FINALIZER)
        .cloned()
        .collect();
    ctx.store.set_finalizers(&chart, finalizers).await?;

    info!("Chart {} cleaned up, finalizer removed", chart.key());
    Ok(Outcome::Uninstalled)
}

async fn install_or_upgrade(chart: Chart, ctx: &Context) -> Result<Outcome> {
    let name = chart.name_any();
    let values = chart
        .spec
        .parsed_values()
        .map_err(|source| OperatorError::InvalidValues {
            chart: name.clone(),
            source,
        })?;

    let (release, outcome) = match chart.release_name() {
        None => {
            let request = InstallRequest {
                release_name: chart.spec.desired_release_name(),
                chart_ref: chart.spec.chart_name.clone(),
                version: chart.spec.version.clone(),
                namespace: chart.spec.namespace.clone(),
                values,
                timeout: chart.spec.timeout.clone(),
            };
            let release = ctx
                .package_manager
                .install(&request)
                .await
                .map_err(|e| OperatorError::Install {
                    chart: name.clone(),
                    source: Box::new(e),
                })?;
            let outcome = Outcome::Installed {
                release: release.name.clone(),
            };
            (release, outcome)
        }
        Some(release_name) => {
            let status = chart.status.clone().unwrap_or_default();
            let request = UpgradeRequest {
                release_name: release_name.to_string(),
                chart_ref: chart.spec.chart_name.clone(),
                current_version: status.version,
                target_version: chart.spec.version.clone(),
                namespace: status.namespace,
                values,
                timeout: chart.spec.timeout.clone(),
            };
            let release = ctx
                .package_manager
                .upgrade(&request)
                .await
                .map_err(|e| OperatorError::Upgrade {
                    chart: name.clone(),
                    source: Box::new(e),
                })?;
            let outcome = Outcome::Upgraded {
                release: release.name.clone(),
            };
            (release, outcome)
        }
    };

    let status = observed_status(release, chart.metadata.generation);
    ctx.store
        .update_status(&chart, &status)
        .await
        .map_err(|e| OperatorError::StatusUpdate {
            chart: name,
            source: Box::new(e),
        })?;

    Ok(outcome)
}

/// Status reflecting what the package manager reported, with any prior error cleared
fn observed_status(release: ReleaseInfo, generation: Option<i64>) -> ChartStatus {
    ChartStatus {
        release_name: release.name,
        version: release.chart_version,
        app_version: release.app_version,
        revision: release.revision,
        namespace: release.namespace,
        updated: Utc::now().to_rfc3339(),
        error: String::new(),
        observed_generation: generation,
    }
}
