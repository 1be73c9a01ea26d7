// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Extensions configuration synchronization.

pub mod extensions;
pub mod manager;
pub mod saver;
pub mod watcher;

pub use extensions::{with_storage_provisioner, ExtensionsSynchronizer};
pub use manager::{SyncEvent, SyncManager, SyncManagerHandle};
pub use saver::{ApplyManifestSaver, FileManifestSaver, ManifestSaver};
pub use watcher::ConfigWatcher;
