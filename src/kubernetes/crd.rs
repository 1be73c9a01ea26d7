// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use async_trait::async_trait;
use kube::{api::GroupVersionKind, discovery, Client};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

/// Resolves whether a kind is served by the API server.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KindResolver: Send + Sync {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<()>;
}

/// Resolves kinds through API discovery of the pinned group version.
pub struct DiscoveryKindResolver {
    client: Client,
}

impl DiscoveryKindResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KindResolver for DiscoveryKindResolver {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<()> {
        discovery::pinned_kind(&self.client, gvk).await?;
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrdWaitError {
    #[error("cancelled before {0} registration was observed")]
    Cancelled(String),

    #[error("{kind} still not registered after {attempts} attempts")]
    Exhausted { kind: String, attempts: u32 },
}

/// Exponential backoff between resolution attempts.
#[derive(Debug, Clone)]
pub struct CrdBackoff {
    pub initial: Duration,
    pub max: Duration,
    /// Unbounded when unset; only cancellation stops the wait
    pub max_attempts: Option<u32>,
}

impl Default for CrdBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(POLL_INTERVAL_SECS),
            max: Duration::from_secs(POLL_MAX_INTERVAL_SECS),
            max_attempts: None,
        }
    }
}

fn describe(gvk: &GroupVersionKind) -> String {
    format!("{} ({}/{})", gvk.kind, gvk.group, gvk.version)
}

/// Wait for a CRD kind to become available in the cluster.
/// Each failed resolution is logged and retried with exponential backoff until
/// it succeeds, the attempt budget runs out, or `cancel` fires.
pub async fn wait_for_crd(
    resolver: &dyn KindResolver,
    gvk: &GroupVersionKind,
    backoff: &CrdBackoff,
    cancel: &CancellationToken,
) -> std::result::Result<(), CrdWaitError> {
    let kind = describe(gvk);
    let mut interval = backoff.initial;
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(CrdWaitError::Cancelled(kind));
        }

        attempts += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(CrdWaitError::Cancelled(kind)),
            result = resolver.resolve(gvk) => result,
        };

        match result {
            Ok(()) => {
                info!("{} CRD is available", kind);
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "{} CRD is not yet ready: {}, retrying in {:?}...",
                    kind, e, interval
                );
            }
        }

        if backoff.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(CrdWaitError::Exhausted { kind, attempts });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(CrdWaitError::Cancelled(kind)),
            _ = tokio::time::sleep(interval) => {}
        }

        // Exponential backoff with max cap
        interval = (interval * 2).min(backoff.max);
    }
}
