//! Per-node rollup served to dashboards

use serde::{Deserialize, Serialize};

use crate::{AvailableDisk, LogicalVolume, VolumeGroup};

/// Aggregate view of one node's current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TopologySummary {
    pub vg_count: usize,
    pub thin_pool_count: usize,
    pub available_disk_count: usize,
    pub total_vg_size_bytes: u64,
    pub total_vg_free_bytes: u64,
    pub registered_count: usize,
}

/// Build a summary from already-filtered row sets.
///
/// `thin_pools` and `available_disks` are counted as given; callers pass the
/// thin-pool and not-in-use subsets.
pub fn summarize_topology(
    volume_groups: &[VolumeGroup],
    thin_pools: &[LogicalVolume],
    available_disks: &[AvailableDisk],
) -> TopologySummary {
    let mut summary = TopologySummary {
        vg_count: volume_groups.len(),
        thin_pool_count: thin_pools.len(),
        available_disk_count: available_disks.len(),
        ..Default::default()
    };

    for vg in volume_groups {
        summary.total_vg_size_bytes = summary.total_vg_size_bytes.saturating_add(vg.size_bytes);
        summary.total_vg_free_bytes = summary.total_vg_free_bytes.saturating_add(vg.free_bytes);
        if vg.is_registered() {
            summary.registered_count += 1;
        }
    }

    summary
}
