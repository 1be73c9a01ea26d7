// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Central coordinator running extension synchronization passes.

use crate::constants::sync::{EVENT_CHANNEL_SIZE, RETRY_INTERVAL_SECS};
use crate::sync::extensions::ExtensionsSynchronizer;
use crate::types::ExtensionsConfig;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Events that trigger a synchronization pass
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The desired-extensions configuration was loaded or changed
    ConfigChanged { config: ExtensionsConfig },
}

/// Receives trigger events and runs the synchronizer, one pass at a time.
///
/// A failed pass is run again every `retry_interval` until it succeeds or a
/// newer configuration arrives.
pub struct SyncManager {
    synchronizer: ExtensionsSynchronizer,
    event_rx: mpsc::Receiver<SyncEvent>,
    retry_interval: Duration,
}

/// Handle to send events to the SyncManager
#[derive(Clone)]
pub struct SyncManagerHandle {
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncManagerHandle {
    pub async fn send(&self, event: SyncEvent) {
        if let Err(e) = self.event_tx.send(event).await {
            error!("Failed to send event to SyncManager: {}", e);
        }
    }

    #[cfg(test)]
    pub(crate) fn from_sender(event_tx: mpsc::Sender<SyncEvent>) -> Self {
        Self { event_tx }
    }
}

impl SyncManager {
    pub fn new(synchronizer: ExtensionsSynchronizer) -> (Self, SyncManagerHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        let manager = Self {
            synchronizer,
            event_rx,
            retry_interval: Duration::from_secs(RETRY_INTERVAL_SECS),
        };

        let handle = SyncManagerHandle { event_tx };
        (manager, handle)
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        info!("SyncManager started, listening for events...");
        let mut failed: Option<ExtensionsConfig> = None;

        loop {
            let retry_pending = failed.is_some();
            let retry_interval = self.retry_interval;
            let retry = async move {
                if retry_pending {
                    tokio::time::sleep(retry_interval).await
                } else {
                    std::future::pending().await
                }
            };

            let config = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.event_rx.recv() => match event {
                    Some(event) => match self.latest(event) {
                        SyncEvent::ConfigChanged { config } => config,
                    },
                    None => break,
                },
                _ = retry => match failed.take() {
                    Some(config) => {
                        info!("Retrying failed synchronization");
                        config
                    }
                    None => continue,
                },
            };

            failed = if self.synchronize(&config).await {
                None
            } else {
                Some(config)
            };
        }

        info!("SyncManager stopped");
        Ok(())
    }

    /// Skip queued events superseded by a newer one
    fn latest(&mut self, mut event: SyncEvent) -> SyncEvent {
        while let Ok(newer) = self.event_rx.try_recv() {
            debug!("Dropping superseded event");
            event = newer;
        }
        event
    }

    /// Run one pass, returning whether it succeeded
    #[instrument(skip(self, config))]
    async fn synchronize(&self, config: &ExtensionsConfig) -> bool {
        match self.synchronizer.synchronize(config).await {
            Ok(()) => true,
            Err(e) => {
                // Errors carry the failing repository or chart
                error!("Failed to synchronize extensions, retrying in {:?}: {}", self.retry_interval, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperatorError;
    use crate::helm::MockPackageManager;
    use crate::sync::saver::MockManifestSaver;
    use crate::types::{HelmExtensions, Repository};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config_with_repo(name: &str) -> ExtensionsConfig {
        ExtensionsConfig {
            helm: Some(HelmExtensions {
                repositories: vec![Repository {
                    name: name.to_string(),
                    url: format!("https://{}.example.com", name),
                    ..Default::default()
                }],
                charts: vec![],
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_latest_event_wins() {
        let mut pm = MockPackageManager::new();
        pm.expect_add_repository()
            .withf(|r| r.name == "third")
            .times(1)
            .returning(|_| Ok(()));
        let synchronizer = ExtensionsSynchronizer::new(Arc::new(pm), Arc::new(MockManifestSaver::new()));
        let (manager, handle) = SyncManager::new(synchronizer);

        for name in ["first", "second", "third"] {
            handle
                .send(SyncEvent::ConfigChanged {
                    config: config_with_repo(name),
                })
                .await;
        }
        drop(handle);

        manager.run(CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_newer_config_replaces_failed_one() {
        let mut pm = MockPackageManager::new();
        pm.expect_add_repository()
            .withf(|r| r.name == "a")
            .times(1)
            .returning(|_| Err(OperatorError::Helm("unreachable".to_string())));
        pm.expect_add_repository()
            .withf(|r| r.name == "b")
            .times(1)
            .returning(|_| Ok(()));
        let synchronizer = ExtensionsSynchronizer::new(Arc::new(pm), Arc::new(MockManifestSaver::new()));
        let (manager, handle) = SyncManager::new(synchronizer);
        let manager = manager.with_retry_interval(Duration::from_secs(3600));

        handle
            .send(SyncEvent::ConfigChanged {
                config: config_with_repo("a"),
            })
            .await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(manager.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle
            .send(SyncEvent::ConfigChanged {
                config: config_with_repo("b"),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_pass_is_retried_without_new_event() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut pm = MockPackageManager::new();
        pm.expect_add_repository().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(OperatorError::Helm("unreachable".to_string()))
            } else {
                Ok(())
            }
        });
        let synchronizer = ExtensionsSynchronizer::new(Arc::new(pm), Arc::new(MockManifestSaver::new()));
        let (manager, handle) = SyncManager::new(synchronizer);
        let manager = manager.with_retry_interval(Duration::from_millis(5));

        handle
            .send(SyncEvent::ConfigChanged {
                config: config_with_repo("a"),
            })
            .await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(manager.run(cancel.clone()));

        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // A successful retry clears the pending config
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        task.await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let synchronizer = ExtensionsSynchronizer::new(
            Arc::new(MockPackageManager::new()),
            Arc::new(MockManifestSaver::new()),
        );
        let (manager, _handle) = SyncManager::new(synchronizer);
        let cancel = CancellationToken::new();
        cancel.cancel();

        manager.run(cancel).await.unwrap();
    }
}
