// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery and Chart record storage.

pub mod crd;
pub mod store;

pub use crd::{wait_for_crd, CrdBackoff, CrdWaitError, DiscoveryKindResolver, KindResolver};
pub use store::{ChartStore, KubeChartStore};

#[cfg(test)]
pub use store::MockChartStore;
