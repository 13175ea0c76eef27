// SPDX-License-Identifier: GPL-3.0-only

//! One sync cycle: converge a node's persisted topology to an observation.
//!
//! Each step commits one entity type through the store. A store failure
//! stops the cycle at that step; entity types committed before it stay
//! committed and the rest keep their previous rows until the next cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storage_contracts::{StoreError, TopologyStore, UpsertOutcome};
use storage_types::{
    AvailableDisk, LogicalVolumeSample, LvClass, LvKey, NodeId, ObservedDisk,
    ObservedLogicalVolume, ObservedPhysicalVolume, ObservedVolumeGroup, PhysicalVolume,
    TopologyObservation, VolumeGroupSample, parse_bytes, parse_count, parse_percent,
};

/// What happens to persisted volume groups missing from an observation.
///
/// Logical volumes are always pruned by absence. Volume groups are retained
/// unless pruning is switched on explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeGroupPruning {
    #[default]
    Retain,
    Prune,
}

/// Row counts of one completed sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub node_id: NodeId,
    pub physical_volumes: usize,
    pub volume_groups: UpsertOutcome,
    pub volume_groups_pruned: usize,
    pub logical_volumes: UpsertOutcome,
    pub logical_volumes_pruned: usize,
    pub disks: usize,
}

pub fn normalize_physical_volume(
    node_id: &NodeId,
    observed: &ObservedPhysicalVolume,
) -> PhysicalVolume {
    let size_bytes = parse_bytes(observed.size.as_ref());
    let free_bytes = parse_bytes(observed.free.as_ref());

    PhysicalVolume {
        node_id: node_id.clone(),
        name: observed.name.clone(),
        vg_name: observed.vg_name.clone().filter(|name| !name.is_empty()),
        size_bytes,
        free_bytes,
        used_bytes: size_bytes.saturating_sub(free_bytes),
        uuid: observed.uuid.clone(),
    }
}

pub fn normalize_volume_group(observed: &ObservedVolumeGroup) -> VolumeGroupSample {
    let size_bytes = parse_bytes(observed.size.as_ref());
    let free_bytes = parse_bytes(observed.free.as_ref());

    VolumeGroupSample {
        name: observed.name.clone(),
        size_bytes,
        free_bytes,
        used_bytes: size_bytes.saturating_sub(free_bytes),
        pv_count: parse_count(observed.pv_count.as_ref()),
        lv_count: parse_count(observed.lv_count.as_ref()),
        uuid: observed.uuid.clone(),
    }
}

pub fn normalize_logical_volume(observed: &ObservedLogicalVolume) -> LogicalVolumeSample {
    let class = LvClass::classify(observed.attr.as_deref(), observed.pool_backref.as_deref());
    let thin_pool_name = observed
        .pool_backref
        .as_deref()
        .map(str::trim)
        .filter(|pool| !pool.is_empty())
        .map(str::to_string);
    let device_path = observed
        .device_path
        .clone()
        .filter(|path| !path.is_empty())
        .unwrap_or_else(|| format!("/dev/{}/{}", observed.vg_name, observed.name));

    LogicalVolumeSample {
        vg_name: observed.vg_name.clone(),
        name: observed.name.clone(),
        size_bytes: parse_bytes(observed.size.as_ref()),
        device_path,
        attr: observed.attr.clone().unwrap_or_default(),
        is_thin_pool: class.is_thin_pool(),
        thin_pool_name,
        thin_pool_fill_percent: if class.is_thin_pool() {
            parse_percent(observed.thin_pool_fill_percent.as_ref())
        } else {
            None
        },
    }
}

pub fn normalize_disk(node_id: &NodeId, observed: &ObservedDisk) -> AvailableDisk {
    AvailableDisk {
        node_id: node_id.clone(),
        device_path: observed.device_path.clone(),
        size_bytes: parse_bytes(observed.size_bytes.as_ref()),
        model: observed.model.clone(),
        serial: observed.serial.clone(),
        rotational: observed.rotational,
        has_partitions: observed.has_partitions,
        in_use: observed.in_use,
    }
}

/// Collapse rows sharing a key; the last occurrence wins.
fn dedupe_by_key<T, K: Ord>(rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut unique = BTreeMap::new();
    for row in rows {
        unique.insert(key(&row), row);
    }
    unique.into_values().collect()
}

/// Applies observations to a [`TopologyStore`].
///
/// Callers must serialize cycles per node; see
/// [`SyncCoordinator`](crate::coordinator::SyncCoordinator).
pub struct Reconciler<S: ?Sized> {
    store: Arc<S>,
    vg_pruning: VolumeGroupPruning,
}

impl<S: TopologyStore + ?Sized> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            vg_pruning: VolumeGroupPruning::default(),
        }
    }

    pub fn with_volume_group_pruning(mut self, vg_pruning: VolumeGroupPruning) -> Self {
        self.vg_pruning = vg_pruning;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn sync(&self, observation: &TopologyObservation) -> Result<SyncReport, StoreError> {
        let node_id = &observation.node_id;

        let physical_volumes = dedupe_by_key(
            observation
                .physical_volumes
                .iter()
                .map(|pv| normalize_physical_volume(node_id, pv))
                .collect(),
            |pv: &PhysicalVolume| pv.name.clone(),
        );
        let physical_volume_count = physical_volumes.len();
        self.store
            .replace_physical_volumes(node_id, physical_volumes)?;

        let vg_samples = dedupe_by_key(
            observation
                .volume_groups
                .iter()
                .map(normalize_volume_group)
                .collect(),
            |vg: &VolumeGroupSample| vg.name.clone(),
        );
        let seen_vgs: BTreeSet<String> = vg_samples.iter().map(|vg| vg.name.clone()).collect();
        let volume_groups = self.store.upsert_volume_groups(node_id, vg_samples)?;

        let lv_samples = dedupe_by_key(
            observation
                .logical_volumes
                .iter()
                .map(normalize_logical_volume)
                .collect(),
            |lv: &LogicalVolumeSample| LvKey::new(&lv.vg_name, &lv.name),
        );
        let logical_volumes = self.store.upsert_logical_volumes(node_id, lv_samples.clone())?;
        let logical_volumes_pruned = self.prune_logical_volumes(node_id, &lv_samples)?;

        let volume_groups_pruned = match self.vg_pruning {
            VolumeGroupPruning::Retain => 0,
            VolumeGroupPruning::Prune => self.prune_volume_groups(node_id, &seen_vgs)?,
        };

        let disks = dedupe_by_key(
            observation
                .disks
                .iter()
                .map(|disk| normalize_disk(node_id, disk))
                .collect(),
            |disk: &AvailableDisk| disk.device_path.clone(),
        );
        let disk_count = disks.len();
        self.store.replace_disks(node_id, disks)?;

        let report = SyncReport {
            node_id: node_id.clone(),
            physical_volumes: physical_volume_count,
            volume_groups,
            volume_groups_pruned,
            logical_volumes,
            logical_volumes_pruned,
            disks: disk_count,
        };

        tracing::info!(
            "Synced {}: {} PVs, VGs +{}/~{}/-{}, LVs +{}/~{}/-{}, {} disks",
            node_id,
            report.physical_volumes,
            report.volume_groups.inserted,
            report.volume_groups.updated,
            report.volume_groups_pruned,
            report.logical_volumes.inserted,
            report.logical_volumes.updated,
            report.logical_volumes_pruned,
            report.disks
        );

        Ok(report)
    }

    fn prune_logical_volumes(
        &self,
        node_id: &NodeId,
        observed: &[LogicalVolumeSample],
    ) -> Result<usize, StoreError> {
        let existing = self.store.logical_volume_keys(node_id)?;

        let stale: Vec<LvKey> = if observed.is_empty() {
            // No LVs reported at all means the host has none left.
            tracing::debug!("{node_id} reports no logical volumes, clearing all");
            existing
        } else {
            let seen: BTreeSet<LvKey> = observed
                .iter()
                .map(|lv| LvKey::new(&lv.vg_name, &lv.name))
                .collect();
            existing
                .into_iter()
                .filter(|key| !seen.contains(key))
                .collect()
        };

        for key in &stale {
            tracing::debug!("Pruning logical volume {key} on {node_id}");
        }
        self.store.delete_logical_volumes(node_id, &stale)
    }

    fn prune_volume_groups(
        &self,
        node_id: &NodeId,
        seen: &BTreeSet<String>,
    ) -> Result<usize, StoreError> {
        let stale: Vec<String> = self
            .store
            .list_volume_groups(node_id)?
            .into_iter()
            .map(|vg| vg.name)
            .filter(|name| !seen.contains(name))
            .collect();

        for name in &stale {
            tracing::debug!("Pruning volume group {name} on {node_id}");
        }
        self.store.delete_volume_groups(node_id, &stale)
    }
}

#[cfg(test)]
mod tests {
    use storage_types::RawValue;

    use super::*;

    fn observed_lv(attr: &str, pool: Option<&str>, fill: Option<&str>) -> ObservedLogicalVolume {
        ObservedLogicalVolume {
            name: "lv0".to_string(),
            vg_name: "vg0".to_string(),
            size: Some(RawValue::from("2048B")),
            attr: Some(attr.to_string()),
            pool_backref: pool.map(str::to_string),
            thin_pool_fill_percent: fill.map(RawValue::from),
            device_path: None,
        }
    }

    #[test]
    fn normalizes_volume_group_sizes() {
        let sample = normalize_volume_group(&ObservedVolumeGroup {
            name: "vg0".to_string(),
            size: Some(RawValue::from("1024207093760B")),
            free: Some(RawValue::from(4096u64)),
            pv_count: Some(RawValue::from("2")),
            lv_count: Some(RawValue::from("garbage")),
            uuid: None,
        });

        assert_eq!(sample.size_bytes, 1024207093760);
        assert_eq!(sample.free_bytes, 4096);
        assert_eq!(sample.used_bytes, 1024207093760 - 4096);
        assert_eq!(sample.pv_count, 2);
        assert_eq!(sample.lv_count, 0);
    }

    #[test]
    fn used_bytes_never_underflow() {
        let pv = normalize_physical_volume(
            &NodeId::new("node-a"),
            &ObservedPhysicalVolume {
                name: "/dev/sda2".to_string(),
                vg_name: Some(String::new()),
                size: Some(RawValue::from(10u64)),
                free: Some(RawValue::from(20u64)),
                uuid: None,
            },
        );

        assert_eq!(pv.used_bytes, 0);
        assert_eq!(pv.vg_name, None);
    }

    #[test]
    fn fill_percent_is_kept_only_for_pools() {
        let pool = normalize_logical_volume(&observed_lv("twi-a-tz--", None, Some("12.50")));
        assert!(pool.is_thin_pool);
        assert_eq!(pool.thin_pool_fill_percent, Some(12.5));
        assert_eq!(pool.device_path, "/dev/vg0/lv0");

        let thin = normalize_logical_volume(&observed_lv("Vwi-a-tz--", Some("pool0"), Some("40")));
        assert!(!thin.is_thin_pool);
        assert_eq!(thin.thin_pool_name.as_deref(), Some("pool0"));
        assert_eq!(thin.thin_pool_fill_percent, None);
    }

    #[test]
    fn blank_pool_backref_is_absent() {
        let pool = normalize_logical_volume(&observed_lv("twi-a-tz--", Some("  "), None));
        assert!(pool.is_thin_pool);
        assert_eq!(pool.thin_pool_name, None);
    }

    #[test]
    fn disk_size_goes_through_the_unit_parser() {
        let observed = |size: Option<RawValue>| ObservedDisk {
            device_path: "/dev/sda".to_string(),
            size_bytes: size,
            model: None,
            serial: None,
            rotational: false,
            has_partitions: false,
            in_use: false,
        };
        let node_id = NodeId::new("node-a");

        let text = normalize_disk(&node_id, &observed(Some(RawValue::from("500107862016"))));
        let suffixed = normalize_disk(&node_id, &observed(Some(RawValue::from("1000B"))));
        let missing = normalize_disk(&node_id, &observed(None));

        assert_eq!(text.size_bytes, 500107862016);
        assert_eq!(suffixed.size_bytes, 1000);
        assert_eq!(missing.size_bytes, 0);
    }

    #[test]
    fn dedupe_keeps_last_occurrence() {
        let rows = dedupe_by_key(
            vec![("a", 1), ("b", 2), ("a", 3)],
            |row: &(&'static str, i32)| row.0,
        );
        assert_eq!(rows, vec![("a", 3), ("b", 2)]);
    }
}
