// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Leader election.
//!
//! Only the leader may install, upgrade or uninstall releases. Reconcilers query
//! [`LeaderElector::is_leader`] on every attempt instead of caching the answer.
//!
//! [`LeaseLeaderElector`] holds a `coordination.k8s.io/v1` Lease. Writes carry the
//! lease resourceVersion, so when two replicas race for an expired lease only one
//! write succeeds and the other gets a 409 Conflict.

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::constants::lease::{
    DURATION_SECS, RENEW_DEADLINE_SECS, RENEW_INTERVAL_SECS, RETRY_INTERVAL_SECS,
};
use crate::error::Result;

#[cfg_attr(test, automock)]
pub trait LeaderElector: Send + Sync {
    /// Whether this process is currently the active singleton
    fn is_leader(&self) -> bool;
}

/// Elector for single-replica deployments
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysLeader;

impl LeaderElector for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LeaseDecision {
    Create,
    Renew,
    TakeOver,
    HeldByOther,
}

/// Decide what to do with the current lease, if any
fn decide(lease: Option<&Lease>, identity: &str, now: DateTime<Utc>) -> LeaseDecision {
    let Some(lease) = lease else {
        return LeaseDecision::Create;
    };
    let spec = lease.spec.as_ref();

    if spec.and_then(|s| s.holder_identity.as_deref()) == Some(identity) {
        return LeaseDecision::Renew;
    }

    let renew_time = spec.and_then(|s| s.renew_time.as_ref());
    let duration_secs = spec.and_then(|s| s.lease_duration_seconds);
    let expired = match (renew_time, duration_secs) {
        (Some(rt), Some(duration)) => now > rt.0 + chrono::Duration::seconds(duration as i64),
        _ => true,
    };

    if expired {
        LeaseDecision::TakeOver
    } else {
        LeaseDecision::HeldByOther
    }
}

/// Leader elector using Kubernetes Leases
pub struct LeaseLeaderElector {
    client: Client,
    lease_name: String,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_interval: Duration,
    renew_deadline: Duration,
    retry_interval: Duration,
    is_leader: AtomicBool,
    last_renewal: Mutex<Option<Instant>>,
}

impl LeaderElector for LeaseLeaderElector {
    /// Leader only while the last renewal is within the renew deadline, so a
    /// replica that cannot reach the API server stops acting before the lease
    /// becomes available to others
    fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst) && self.renewed_within_deadline()
    }
}

impl LeaseLeaderElector {
    pub fn new(client: Client, lease_name: &str, namespace: &str, identity: &str) -> Self {
        Self {
            client,
            lease_name: lease_name.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            lease_duration: Duration::from_secs(DURATION_SECS),
            renew_interval: Duration::from_secs(RENEW_INTERVAL_SECS),
            renew_deadline: Duration::from_secs(RENEW_DEADLINE_SECS),
            retry_interval: Duration::from_secs(RETRY_INTERVAL_SECS),
            is_leader: AtomicBool::new(false),
            last_renewal: Mutex::new(None),
        }
    }

    fn renewed_within_deadline(&self) -> bool {
        match self.last_renewal.lock() {
            Ok(last) => last.is_some_and(|t| t.elapsed() < self.renew_deadline),
            Err(_) => false,
        }
    }

    fn record_renewal(&self) {
        if let Ok(mut last) = self.last_renewal.lock() {
            *last = Some(Instant::now());
        }
    }

    /// Keep acquiring or renewing the lease until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        info!(
            identity = %self.identity,
            lease = %self.lease_name,
            "Starting leader election"
        );

        loop {
            let renewed = match self.try_acquire_or_renew().await {
                Ok(true) => {
                    if !self.is_leader() {
                        info!(identity = %self.identity, "Leadership acquired");
                    }
                    self.record_renewal();
                    self.is_leader.store(true, Ordering::SeqCst);
                    true
                }
                Ok(false) => {
                    if self.is_leader() {
                        warn!(identity = %self.identity, "Leadership lost");
                    }
                    self.is_leader.store(false, Ordering::SeqCst);
                    debug!(identity = %self.identity, "Lease held by another, waiting...");
                    false
                }
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "Failed to acquire or renew lease");
                    if self.is_leader.load(Ordering::SeqCst) && !self.renewed_within_deadline() {
                        warn!(identity = %self.identity, "Renew deadline passed, stepping down");
                        self.is_leader.store(false, Ordering::SeqCst);
                    }
                    false
                }
            };

            // Failed renewals are retried quickly to stay within the renew deadline
            let wait = if renewed {
                self.renew_interval
            } else {
                self.retry_interval
            };
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.is_leader.store(false, Ordering::SeqCst);
                    info!(identity = %self.identity, "Leader election stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Try to acquire or renew the lease atomically
    async fn try_acquire_or_renew(&self) -> Result<bool> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let now = Utc::now();
        let existing = api.get_opt(&self.lease_name).await?;

        match decide(existing.as_ref(), &self.identity, now) {
            LeaseDecision::HeldByOther => Ok(false),
            LeaseDecision::Create => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(self.lease_name.clone()),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    spec: Some(self.lease_spec(now, now, 0)),
                };
                match api.create(&PostParams::default(), &lease).await {
                    Ok(_) => Ok(true),
                    Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
            decision => {
                let Some(mut lease) = existing else {
                    return Ok(false);
                };
                let spec = lease.spec.clone().unwrap_or_default();
                let (acquire_time, transitions) = if decision == LeaseDecision::Renew {
                    (
                        spec.acquire_time.map(|t| t.0).unwrap_or(now),
                        spec.lease_transitions.unwrap_or(0),
                    )
                } else {
                    (now, spec.lease_transitions.unwrap_or(0) + 1)
                };
                lease.spec = Some(self.lease_spec(acquire_time, now, transitions));

                match api.replace(&self.lease_name, &PostParams::default(), &lease).await {
                    Ok(_) => Ok(true),
                    Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn lease_spec(&self, acquire_time: DateTime<Utc>, now: DateTime<Utc>, transitions: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.lease_duration.as_secs() as i32),
            acquire_time: Some(MicroTime(acquire_time)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }
    }
}
