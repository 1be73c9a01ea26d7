// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The operator name used for server-side apply and lease identity prefixes
pub const OPERATOR_NAME: &str = "chart-operator";

/// Chart custom resource identity
pub mod chart {
    pub const GROUP: &str = "helm.chart-operator.io";
    pub const VERSION: &str = "v1beta1";
    pub const KIND: &str = "Chart";

    /// Finalizer blocking removal of a Chart until its release is uninstalled
    pub const FINALIZER: &str = "helm.chart-operator.io/uninstall-helm-release";

    /// Namespace Chart records are rendered into and watched in
    pub const DEFAULT_NAMESPACE: &str = "kube-system";

    /// Prefix of the Chart resource name rendered for a configured chart
    pub const RESOURCE_PREFIX: &str = "extension-chart-";

    /// Prefix of the manifest filename persisted for a configured chart
    pub const MANIFEST_PREFIX: &str = "addon_crd_manifest_";
}

/// Built-in OpenEBS local storage provisioner
pub mod openebs {
    pub const REPOSITORY_NAME: &str = "openebs-internal";
    pub const REPOSITORY_URL: &str = "https://openebs.github.io/charts";
    pub const CHART_NAME: &str = "openebs";
    pub const CHART_REF: &str = "openebs-internal/openebs";
    pub const CHART_VERSION: &str = "3.0.3";
    pub const TARGET_NAMESPACE: &str = "openebs";
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Reconciliation timing
pub mod reconcile {
    /// Delay before a failed reconciliation is retried
    pub const REQUEUE_ON_ERROR_SECS: u64 = 30;
    /// Delay before a record skipped by a non-leader replica is looked at again
    pub const REQUEUE_NOT_LEADER_SECS: u64 = super::lease::RETRY_INTERVAL_SECS;
}

/// Extensions config file polling
pub mod sync {
    pub const CONFIG_POLL_INTERVAL_SECS: u64 = 15;
    pub const EVENT_CHANNEL_SIZE: usize = 16;
    /// Delay before a failed synchronization pass is run again
    pub const RETRY_INTERVAL_SECS: u64 = 30;
}

/// Leader election lease timing
pub mod lease {
    pub const DEFAULT_NAME: &str = "chart-operator-leader";
    pub const DURATION_SECS: u64 = 30;
    pub const RENEW_INTERVAL_SECS: u64 = 10;
    /// A leader that has not renewed within this long stops acting as leader,
    /// ahead of the lease expiring for other replicas
    pub const RENEW_DEADLINE_SECS: u64 = 20;
    pub const RETRY_INTERVAL_SECS: u64 = 5;
}
