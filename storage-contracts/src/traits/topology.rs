// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use storage_types::{
    AvailableDisk, LogicalVolume, LogicalVolumeSample, LvKey, NodeId, PhysicalVolume,
    Registration, VolumeGroup, VolumeGroupSample,
};

use crate::StoreError;

/// Rows touched by one upsert-merge batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
}

/// Persisted per-node storage topology.
///
/// Every mutating call touches exactly one entity type and is one
/// transaction: either the whole call is visible to readers or none of it.
/// Calls on different entity types are isolated from one another.
/// Implementations do not serialize sync cycles; callers must not run two
/// cycles for the same node concurrently.
pub trait TopologyStore: Send + Sync {
    /// Delete every PV row of `node_id` and insert `volumes`.
    fn replace_physical_volumes(
        &self,
        node_id: &NodeId,
        volumes: Vec<PhysicalVolume>,
    ) -> Result<(), StoreError>;

    /// Delete every disk row of `node_id` and insert `disks`.
    fn replace_disks(&self, node_id: &NodeId, disks: Vec<AvailableDisk>) -> Result<(), StoreError>;

    /// Insert new volume groups and merge known ones, keeping registration.
    fn upsert_volume_groups(
        &self,
        node_id: &NodeId,
        samples: Vec<VolumeGroupSample>,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Insert new logical volumes and merge known ones, keeping registration.
    fn upsert_logical_volumes(
        &self,
        node_id: &NodeId,
        samples: Vec<LogicalVolumeSample>,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Remove the named volume groups. Unknown names are ignored.
    fn delete_volume_groups(
        &self,
        node_id: &NodeId,
        names: &[String],
    ) -> Result<usize, StoreError>;

    /// Remove the given logical volumes. Unknown keys are ignored.
    fn delete_logical_volumes(
        &self,
        node_id: &NodeId,
        keys: &[LvKey],
    ) -> Result<usize, StoreError>;

    /// Set (`Some`) or clear (`None`) the registration of a volume group.
    fn set_volume_group_registration(
        &self,
        node_id: &NodeId,
        vg_name: &str,
        registration: Option<Registration>,
    ) -> Result<VolumeGroup, StoreError>;

    /// Set (`Some`) or clear (`None`) the registration of a logical volume.
    fn set_logical_volume_registration(
        &self,
        node_id: &NodeId,
        key: &LvKey,
        registration: Option<Registration>,
    ) -> Result<LogicalVolume, StoreError>;

    fn list_physical_volumes(&self, node_id: &NodeId) -> Result<Vec<PhysicalVolume>, StoreError>;

    fn list_volume_groups(&self, node_id: &NodeId) -> Result<Vec<VolumeGroup>, StoreError>;

    fn list_logical_volumes(&self, node_id: &NodeId) -> Result<Vec<LogicalVolume>, StoreError>;

    fn list_disks(&self, node_id: &NodeId) -> Result<Vec<AvailableDisk>, StoreError>;

    /// Drop every topology row of a decommissioned node.
    fn delete_node(&self, node_id: &NodeId) -> Result<(), StoreError>;

    fn list_thin_pools(&self, node_id: &NodeId) -> Result<Vec<LogicalVolume>, StoreError> {
        Ok(self
            .list_logical_volumes(node_id)?
            .into_iter()
            .filter(|lv| lv.class().is_thin_pool())
            .collect())
    }

    fn list_available_disks(&self, node_id: &NodeId) -> Result<Vec<AvailableDisk>, StoreError> {
        Ok(self
            .list_disks(node_id)?
            .into_iter()
            .filter(AvailableDisk::is_available)
            .collect())
    }

    fn logical_volume_keys(&self, node_id: &NodeId) -> Result<Vec<LvKey>, StoreError> {
        Ok(self
            .list_logical_volumes(node_id)?
            .iter()
            .map(LogicalVolume::lv_key)
            .collect())
    }
}
