// SPDX-License-Identifier: GPL-3.0-only

//! Host-side collection of storage topology
//!
//! This crate runs the LVM reporting tools and `lsblk` on the local host and
//! turns their output into a [`TopologyObservation`] for the reconciler.
//! Numeric columns are passed through as raw strings; normalization happens
//! on the reconciling side.

pub mod command;
pub mod disk_tools;
pub mod error;
pub mod lvm_tools;

pub use disk_tools::collect_disks;
pub use error::{Result, SysError};
pub use lvm_tools::{collect_lvm, LvmReport};

use storage_types::{NodeId, TopologyObservation};

/// Collect the full topology of this host.
pub fn collect_observation(node_id: NodeId, include_disks: bool) -> Result<TopologyObservation> {
    let lvm = collect_lvm()?;
    let disks = if include_disks {
        collect_disks()?
    } else {
        Vec::new()
    };

    tracing::debug!(
        "Collected {} PVs, {} VGs, {} LVs, {} disks for {}",
        lvm.physical_volumes.len(),
        lvm.volume_groups.len(),
        lvm.logical_volumes.len(),
        disks.len(),
        node_id
    );

    Ok(TopologyObservation {
        node_id,
        physical_volumes: lvm.physical_volumes,
        volume_groups: lvm.volume_groups,
        logical_volumes: lvm.logical_volumes,
        disks,
    })
}
