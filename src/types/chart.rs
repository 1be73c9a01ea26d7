// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

use crate::constants::chart::FINALIZER;

/// Desired state of a Helm release.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "helm.chart-operator.io", version = "v1beta1", kind = "Chart")]
#[kube(namespaced)]
#[kube(status = "ChartStatus")]
#[kube(
    printcolumn = r#"{"name":"Release","type":"string","jsonPath":".status.releaseName"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".status.namespace"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    /// Chart reference, e.g. `repo/foo`
    pub chart_name: String,
    /// Release name to install under; derived from the chart reference when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    pub version: String,
    /// Target namespace of the release
    pub namespace: String,
    /// Raw YAML values
    #[serde(default)]
    pub values: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Observed state of the release, written only by the chart reconciler.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartStatus {
    #[serde(default)]
    pub release_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub revision: i64,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ChartSpec {
    /// Release name to use for a fresh install
    pub fn desired_release_name(&self) -> String {
        match &self.release_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self
                .chart_name
                .rsplit('/')
                .next()
                .unwrap_or(&self.chart_name)
                .to_string(),
        }
    }

    /// Parse the raw values payload; an empty payload is an empty mapping
    pub fn parsed_values(&self) -> serde_yaml::Result<serde_yaml::Value> {
        if self.values.trim().is_empty() {
            return Ok(serde_yaml::Value::Mapping(Default::default()));
        }
        serde_yaml::from_str(&self.values)
    }
}

impl Chart {
    /// Name of the installed release, if the chart was ever installed
    pub fn release_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.release_name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn is_installed(&self) -> bool {
        self.release_name().is_some()
    }

    /// Check if the deletion marker is set
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    /// Whether the current spec generation has not been converged yet, or the
    /// last attempt recorded an error
    pub fn needs_reconcile(&self) -> bool {
        let Some(status) = &self.status else {
            return true;
        };
        if !status.error.is_empty() {
            return true;
        }
        match (self.metadata.generation, status.observed_generation) {
            (Some(generation), Some(observed)) => generation != observed,
            _ => true,
        }
    }

    /// `namespace/name` key used in logs and errors
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;

    fn make_chart(name: &str, status: Option<ChartStatus>) -> Chart {
        Chart {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("kube-system".to_string()),
                ..Default::default()
            },
            spec: ChartSpec {
                chart_name: "repo/foo".to_string(),
                version: "1.0.0".to_string(),
                namespace: "ns1".to_string(),
                ..Default::default()
            },
            status,
        }
    }

    #[test]
    fn test_release_name_empty_status() {
        let chart = make_chart("foo", None);
        assert_eq!(chart.release_name(), None);
        assert!(!chart.is_installed());
    }

    #[test]
    fn test_release_name_blank_is_not_installed() {
        let chart = make_chart("foo", Some(ChartStatus::default()));
        assert!(!chart.is_installed());
    }

    #[test]
    fn test_release_name_from_status() {
        let chart = make_chart(
            "foo",
            Some(ChartStatus {
                release_name: "foo".to_string(),
                ..Default::default()
            }),
        );
        assert_eq!(chart.release_name(), Some("foo"));
        assert!(chart.is_installed());
    }

    #[test]
    fn test_desired_release_name_from_chart_ref() {
        let chart = make_chart("foo", None);
        assert_eq!(chart.spec.desired_release_name(), "foo");
    }

    #[test]
    fn test_desired_release_name_explicit() {
        let mut chart = make_chart("foo", None);
        chart.spec.release_name = Some("bar".to_string());
        assert_eq!(chart.spec.desired_release_name(), "bar");
    }

    #[test]
    fn test_is_being_deleted() {
        let mut chart = make_chart("foo", None);
        assert!(!chart.is_being_deleted());
        chart.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        assert!(chart.is_being_deleted());
    }

    #[test]
    fn test_has_finalizer() {
        let mut chart = make_chart("foo", None);
        assert!(!chart.has_finalizer());
        chart.metadata.finalizers = Some(vec!["other/finalizer".to_string()]);
        assert!(!chart.has_finalizer());
        chart.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        assert!(chart.has_finalizer());
    }

    #[test]
    fn test_needs_reconcile_tracks_generation() {
        let mut chart = make_chart("foo", None);
        chart.metadata.generation = Some(2);
        assert!(chart.needs_reconcile());

        chart.status = Some(ChartStatus {
            observed_generation: Some(1),
            ..Default::default()
        });
        assert!(chart.needs_reconcile());

        chart.status = Some(ChartStatus {
            observed_generation: Some(2),
            ..Default::default()
        });
        assert!(!chart.needs_reconcile());
    }

    #[test]
    fn test_needs_reconcile_with_recorded_error() {
        let mut chart = make_chart(
            "foo",
            Some(ChartStatus {
                observed_generation: Some(2),
                error: "install failed".to_string(),
                ..Default::default()
            }),
        );
        chart.metadata.generation = Some(2);

        assert!(chart.needs_reconcile());
    }

    #[test]
    fn test_parsed_values_empty() {
        let chart = make_chart("foo", None);
        let values = chart.spec.parsed_values().unwrap();
        assert!(values.as_mapping().unwrap().is_empty());
    }

    #[test]
    fn test_parsed_values_yaml() {
        let mut chart = make_chart("foo", None);
        chart.spec.values = "replicas: 3\nimage:\n  tag: v1\n".to_string();
        let values = chart.spec.parsed_values().unwrap();
        assert_eq!(values["replicas"].as_u64(), Some(3));
        assert_eq!(values["image"]["tag"].as_str(), Some("v1"));
    }

    #[test]
    fn test_parsed_values_invalid() {
        let mut chart = make_chart("foo", None);
        chart.spec.values = "key: [unclosed".to_string();
        assert!(chart.spec.parsed_values().is_err());
    }

    #[test]
    fn test_key() {
        let chart = make_chart("foo", None);
        assert_eq!(chart.key(), "kube-system/foo");
    }
}
