// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the storage topology reconciler
//!
//! This crate is the single source of truth for topology types:
//!
//! - **storage-sys**: builds [`TopologyObservation`]s from host tooling
//! - **storage-contracts**: persists the row types behind `TopologyStore`
//! - **storage-service**: normalizes observations into samples and merges them
//!
//! ## Row lifecycles
//!
//! - [`PhysicalVolume`], [`AvailableDisk`] → replaced wholesale every sync
//! - [`VolumeGroup`], [`LogicalVolume`] → upsert-merged through [`MergeRow`],
//!   keeping their [`Registration`] across refreshes

pub mod common;
pub mod disk;
pub mod lvm;
pub mod node;
pub mod observation;
pub mod summary;

pub use common::{RawValue, bytes_to_pretty, parse_bytes, parse_count, parse_percent};
pub use disk::AvailableDisk;
pub use lvm::{
    LogicalVolume, LogicalVolumeSample, LvClass, LvKey, MergeRow, PhysicalVolume, Registration,
    VolumeGroup, VolumeGroupSample,
};
pub use node::NodeId;
pub use observation::{
    ObservedDisk, ObservedLogicalVolume, ObservedPhysicalVolume, ObservedVolumeGroup,
    TopologyObservation,
};
pub use summary::{TopologySummary, summarize_topology};
