// SPDX-License-Identifier: GPL-3.0-only

//! Storage topology reconciliation
//!
//! Merges freshly observed LVM layouts into a persisted per-node snapshot:
//!
//! - [`store::SnapshotStore`] persists rows behind `storage_contracts::TopologyStore`
//! - [`reconcile::Reconciler`] runs one sync cycle for one node
//! - [`summary::SummaryAggregator`] answers read-only rollups
//! - [`coordinator::SyncCoordinator`] serializes cycles per node
//! - [`poller`] drives cycles from the local host's LVM tools

pub mod config;
pub mod coordinator;
pub mod error;
pub mod poller;
pub mod reconcile;
pub mod store;
pub mod summary;

pub use config::{ConfigError, ServiceConfig};
pub use coordinator::SyncCoordinator;
pub use error::{Result, ServiceError};
pub use reconcile::{Reconciler, SyncReport, VolumeGroupPruning};
pub use store::SnapshotStore;
pub use summary::SummaryAggregator;
