// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

use crate::kubernetes::crd::CrdWaitError;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("can't init repository `{url}`: {source}")]
    RepositoryAdd {
        url: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("can't create chart CR instance `{chart}`: {source}")]
    ManifestRender {
        chart: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("can't save addon CRD manifest for `{chart}`: {source}")]
    ManifestSave {
        chart: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("can't reconcile installation for `{chart}`: {source}")]
    Install {
        chart: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("can't reconcile upgrade for `{chart}`: {source}")]
    Upgrade {
        chart: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("can't uninstall release `{namespace}/{release}` of `{chart}`: {source}")]
    Uninstall {
        chart: String,
        release: String,
        namespace: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("can't update status for `{chart}`: {source}")]
    StatusUpdate {
        chart: String,
        #[source]
        source: Box<OperatorError>,
    },

    #[error("helm command failed: {0}")]
    Helm(String),

    #[error("invalid values for `{chart}`: {source}")]
    InvalidValues {
        chart: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid extensions config: {0}")]
    InvalidConfig(String),

    #[error("chart CRD is not registered, check CRD registration: {0}")]
    CrdNotReady(#[from] CrdWaitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, OperatorError>;
