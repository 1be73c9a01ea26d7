// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Chart record store backed by the Kubernetes API.
//!
//! Writes carry the resourceVersion of the object they were computed from, so a
//! write against a stale version fails with a conflict instead of overwriting.

use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::json;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;
use crate::types::{Chart, ChartStatus};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChartStore: Send + Sync {
    /// Fetch a chart by name; `None` when it no longer exists
    async fn get(&self, name: &str) -> Result<Option<Chart>>;

    /// Replace the finalizer list of `chart`, returning the updated record
    async fn set_finalizers(&self, chart: &Chart, finalizers: Vec<String>) -> Result<Chart>;

    /// Replace the whole status sub-record of `chart`, returning the updated record
    async fn update_status(&self, chart: &Chart, status: &ChartStatus) -> Result<Chart>;
}

/// Store for Chart resources in a single namespace
#[derive(Clone)]
pub struct KubeChartStore {
    api: Api<Chart>,
}

impl KubeChartStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl ChartStore for KubeChartStore {
    async fn get(&self, name: &str) -> Result<Option<Chart>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn set_finalizers(&self, chart: &Chart, finalizers: Vec<String>) -> Result<Chart> {
        let name = chart.name_any();
        debug!("Setting finalizers of chart {} to {:?}", name, finalizers);

        let patch = json!({
            "metadata": {
                "resourceVersion": chart.resource_version(),
                "finalizers": finalizers,
            }
        });
        Ok(self
            .api
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn update_status(&self, chart: &Chart, status: &ChartStatus) -> Result<Chart> {
        let name = chart.name_any();
        debug!("Updating status of chart {}", name);

        let patch = json!({
            "metadata": {
                "resourceVersion": chart.resource_version(),
            },
            "status": status,
        });
        Ok(self
            .api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }
}
