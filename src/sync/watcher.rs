// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Polls the extensions config file and reports content changes to the SyncManager.

use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::sync::manager::{SyncEvent, SyncManagerHandle};
use crate::types::ExtensionsConfig;

pub struct ConfigWatcher {
    path: PathBuf,
    interval: Duration,
    handle: SyncManagerHandle,
    last_content: Option<String>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, handle: SyncManagerHandle) -> Self {
        Self {
            path: path.into(),
            interval,
            handle,
            last_content: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        info!("Watching extensions config {}", self.path.display());

        loop {
            self.poll().await;

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Config watcher stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Read the config once, sending an event when its content changed
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn poll(&mut self) {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to read extensions config: {}", e);
                return;
            }
        };

        if self.last_content.as_deref() == Some(content.as_str()) {
            debug!("Extensions config unchanged");
            return;
        }

        match ExtensionsConfig::from_yaml(&content) {
            Ok(config) => {
                info!("Extensions config changed, triggering synchronization");
                self.last_content = Some(content);
                self.handle.send(SyncEvent::ConfigChanged { config }).await;
            }
            Err(e) => {
                // Keep the previous content so the broken file is reported again next poll
                error!("Invalid extensions config: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::manager::SyncManagerHandle;
    use tokio::sync::mpsc;

    const CONFIG: &str = r#"
helm:
  charts:
    - name: foo
      chartName: repo/foo
      version: 1.0.0
      namespace: ns1
"#;

    fn watcher(path: PathBuf) -> (ConfigWatcher, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(4);
        let watcher = ConfigWatcher::new(path, Duration::from_millis(5), SyncManagerHandle::from_sender(tx));
        (watcher, rx)
    }

    #[tokio::test]
    async fn test_poll_emits_once_per_change() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("extensions.yaml");
        std::fs::write(&path, CONFIG).unwrap();
        let (mut watcher, mut rx) = watcher(path.clone());

        watcher.poll().await;
        watcher.poll().await;

        let Some(SyncEvent::ConfigChanged { config }) = rx.try_recv().ok() else {
            panic!("expected a config change event");
        };
        assert_eq!(config.helm.unwrap().charts[0].name, "foo");
        assert!(rx.try_recv().is_err());

        std::fs::write(&path, CONFIG.replace("1.0.0", "2.0.0")).unwrap();
        watcher.poll().await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_poll_skips_invalid_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("extensions.yaml");
        std::fs::write(&path, "storage:\n  type: tape\n").unwrap();
        let (mut watcher, mut rx) = watcher(path);

        watcher.poll().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poll_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut watcher, mut rx) = watcher(tmp.path().join("absent.yaml"));

        watcher.poll().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("extensions.yaml");
        std::fs::write(&path, CONFIG).unwrap();
        let (watcher, mut rx) = watcher(path);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(watcher.run(cancel.clone()));
        assert!(rx.recv().await.is_some());
        cancel.cancel();

        assert!(task.await.unwrap().is_ok());
    }
}
