// SPDX-License-Identifier: GPL-3.0-only

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use storage_contracts::{StoreError, StoreErrorKind, TopologyStore, UpsertOutcome};
use storage_types::{
    AvailableDisk, LogicalVolume, LogicalVolumeSample, LvKey, MergeRow, NodeId, PhysicalVolume,
    Registration, VolumeGroup, VolumeGroupSample,
};

use super::journal::{Journal, LockMode, Table};

/// Rows of one entity type for one node.
trait Partition: Default + Clone {
    type Row: Serialize + DeserializeOwned;

    fn rows(&self) -> Vec<&Self::Row>;
    fn from_rows(rows: Vec<Self::Row>) -> Self;
    fn is_empty(&self) -> bool;
}

impl<T: Clone + Serialize + DeserializeOwned> Partition for Vec<T> {
    type Row = T;

    fn rows(&self) -> Vec<&T> {
        self.iter().collect()
    }

    fn from_rows(rows: Vec<T>) -> Self {
        rows
    }

    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl<R> Partition for BTreeMap<R::Key, R>
where
    R: MergeRow + Clone + Serialize + DeserializeOwned,
{
    type Row = R;

    fn rows(&self) -> Vec<&R> {
        self.values().collect()
    }

    fn from_rows(rows: Vec<R>) -> Self {
        rows.into_iter().map(|row| (row.key(), row)).collect()
    }

    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

type Tables<P> = RwLock<BTreeMap<NodeId, P>>;

/// Topology store with one lock per entity type.
///
/// A mutation stages a copy of the node's partition, applies the change,
/// makes it durable and only then publishes it. Readers never see a
/// half-applied call, and an error leaves the previous rows in place.
///
/// In memory the partitions live in `RwLock` tables. When opened on a
/// directory the table files are the only copy: every read and every
/// transaction starts from the node's file under that table's `flock`, so
/// several stores (the daemon and CLI invocations) can share one root.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    physical_volumes: Tables<Vec<PhysicalVolume>>,
    volume_groups: Tables<BTreeMap<String, VolumeGroup>>,
    logical_volumes: Tables<BTreeMap<LvKey, LogicalVolume>>,
    disks: Tables<Vec<AvailableDisk>>,
    journal: Option<Journal>,
}

fn poisoned(table: Table) -> StoreError {
    StoreError::new(
        StoreErrorKind::Unavailable,
        format!("{table:?} table lock poisoned"),
    )
}

fn node_of<R>(rows: &[R], node_id: impl Fn(&R) -> &NodeId) -> Option<NodeId> {
    rows.first().map(|row| node_id(row).clone())
}

/// Nodes with rows in one table on disk.
fn stored_nodes<R: DeserializeOwned>(
    journal: &Journal,
    table: Table,
    node_id: impl Fn(&R) -> &NodeId,
) -> Result<Vec<NodeId>, StoreError> {
    let _lock = journal.lock(table, LockMode::Shared)?;
    Ok(journal
        .load::<R>(table)?
        .iter()
        .filter_map(|rows| node_of(rows, &node_id))
        .collect())
}

fn upsert<R: MergeRow>(
    partition: &mut BTreeMap<R::Key, R>,
    node_id: &NodeId,
    samples: Vec<R::Sample>,
) -> UpsertOutcome {
    let now = Utc::now();
    let mut outcome = UpsertOutcome::default();

    for sample in samples {
        let key = R::sample_key(&sample);
        match partition.get_mut(&key) {
            Some(existing) => {
                existing.merge(sample, now);
                outcome.updated += 1;
            }
            None => {
                tracing::debug!("Inserting {key} on {node_id}");
                partition.insert(key, R::insert(node_id, sample, now));
                outcome.inserted += 1;
            }
        }
    }

    outcome
}

fn delete_keys<R: MergeRow>(partition: &mut BTreeMap<R::Key, R>, keys: &[R::Key]) -> usize {
    keys.iter()
        .filter(|key| partition.remove(*key).is_some())
        .count()
}

impl SnapshotStore {
    /// Store without durability, for tests and one-shot commands.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) a store persisted under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let journal = Journal::open(root)?;
        tracing::info!("Opening topology store at {}", journal.root().display());

        Ok(Self {
            journal: Some(journal),
            ..Self::default()
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.journal.as_ref().map(Journal::root)
    }

    /// Nodes with at least one row in any table.
    pub fn nodes(&self) -> Result<BTreeSet<NodeId>, StoreError> {
        let mut nodes = BTreeSet::new();

        if let Some(journal) = &self.journal {
            nodes.extend(stored_nodes(journal, Table::PhysicalVolumes, |pv: &PhysicalVolume| {
                &pv.node_id
            })?);
            nodes.extend(stored_nodes(journal, Table::VolumeGroups, |vg: &VolumeGroup| {
                &vg.node_id
            })?);
            nodes.extend(stored_nodes(journal, Table::LogicalVolumes, |lv: &LogicalVolume| {
                &lv.node_id
            })?);
            nodes.extend(stored_nodes(journal, Table::Disks, |disk: &AvailableDisk| {
                &disk.node_id
            })?);
            return Ok(nodes);
        }

        nodes.extend(self.read_nodes(&self.physical_volumes, Table::PhysicalVolumes)?);
        nodes.extend(self.read_nodes(&self.volume_groups, Table::VolumeGroups)?);
        nodes.extend(self.read_nodes(&self.logical_volumes, Table::LogicalVolumes)?);
        nodes.extend(self.read_nodes(&self.disks, Table::Disks)?);
        Ok(nodes)
    }

    fn read_nodes<P>(&self, tables: &Tables<P>, table: Table) -> Result<Vec<NodeId>, StoreError> {
        let guard = tables.read().map_err(|_| poisoned(table))?;
        Ok(guard.keys().cloned().collect())
    }

    fn read<P: Partition, T>(
        &self,
        tables: &Tables<P>,
        table: Table,
        node_id: &NodeId,
        project: impl FnOnce(&P) -> T,
    ) -> Result<T, StoreError> {
        let guard = tables.read().map_err(|_| poisoned(table))?;

        if let Some(journal) = &self.journal {
            let _lock = journal.lock(table, LockMode::Shared)?;
            let partition = P::from_rows(journal.read_rows(node_id, table)?);
            return Ok(project(&partition));
        }

        let empty = P::default();
        Ok(project(guard.get(node_id).unwrap_or(&empty)))
    }

    fn clear<P: Partition>(
        &self,
        tables: &Tables<P>,
        table: Table,
        node_id: &NodeId,
    ) -> Result<(), StoreError> {
        self.commit(tables, table, node_id, |partition| {
            *partition = P::default();
            Ok(())
        })
    }

    /// One transaction on one table partition.
    fn commit<P: Partition, T>(
        &self,
        tables: &Tables<P>,
        table: Table,
        node_id: &NodeId,
        mutate: impl FnOnce(&mut P) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = tables.write().map_err(|_| poisoned(table))?;

        if let Some(journal) = &self.journal {
            let _lock = journal.lock(table, LockMode::Exclusive)?;
            let mut staged = P::from_rows(journal.read_rows(node_id, table)?);
            let result = mutate(&mut staged)?;
            if staged.is_empty() {
                journal.remove_table(node_id, table)?;
            } else {
                journal.write(node_id, table, &staged.rows())?;
            }
            return Ok(result);
        }

        let mut staged = guard.get(node_id).cloned().unwrap_or_default();
        let result = mutate(&mut staged)?;
        if staged.is_empty() {
            guard.remove(node_id);
        } else {
            guard.insert(node_id.clone(), staged);
        }
        Ok(result)
    }
}

impl TopologyStore for SnapshotStore {
    fn replace_physical_volumes(
        &self,
        node_id: &NodeId,
        volumes: Vec<PhysicalVolume>,
    ) -> Result<(), StoreError> {
        self.commit(
            &self.physical_volumes,
            Table::PhysicalVolumes,
            node_id,
            |partition| {
                *partition = volumes;
                Ok(())
            },
        )
    }

    fn replace_disks(&self, node_id: &NodeId, disks: Vec<AvailableDisk>) -> Result<(), StoreError> {
        self.commit(&self.disks, Table::Disks, node_id, |partition| {
            *partition = disks;
            Ok(())
        })
    }

    fn upsert_volume_groups(
        &self,
        node_id: &NodeId,
        samples: Vec<VolumeGroupSample>,
    ) -> Result<UpsertOutcome, StoreError> {
        self.commit(
            &self.volume_groups,
            Table::VolumeGroups,
            node_id,
            |partition| Ok(upsert(partition, node_id, samples)),
        )
    }

    fn upsert_logical_volumes(
        &self,
        node_id: &NodeId,
        samples: Vec<LogicalVolumeSample>,
    ) -> Result<UpsertOutcome, StoreError> {
        self.commit(
            &self.logical_volumes,
            Table::LogicalVolumes,
            node_id,
            |partition| Ok(upsert(partition, node_id, samples)),
        )
    }

    fn delete_volume_groups(
        &self,
        node_id: &NodeId,
        names: &[String],
    ) -> Result<usize, StoreError> {
        if names.is_empty() {
            return Ok(0);
        }
        self.commit(
            &self.volume_groups,
            Table::VolumeGroups,
            node_id,
            |partition| Ok(delete_keys(partition, names)),
        )
    }

    fn delete_logical_volumes(
        &self,
        node_id: &NodeId,
        keys: &[LvKey],
    ) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.commit(
            &self.logical_volumes,
            Table::LogicalVolumes,
            node_id,
            |partition| Ok(delete_keys(partition, keys)),
        )
    }

    fn set_volume_group_registration(
        &self,
        node_id: &NodeId,
        vg_name: &str,
        registration: Option<Registration>,
    ) -> Result<VolumeGroup, StoreError> {
        self.commit(
            &self.volume_groups,
            Table::VolumeGroups,
            node_id,
            |partition| {
                let vg = partition.get_mut(vg_name).ok_or_else(|| {
                    StoreError::not_found(format!("volume group {vg_name} on {node_id}"))
                })?;
                *vg.registration_mut() = registration;
                Ok(vg.clone())
            },
        )
    }

    fn set_logical_volume_registration(
        &self,
        node_id: &NodeId,
        key: &LvKey,
        registration: Option<Registration>,
    ) -> Result<LogicalVolume, StoreError> {
        self.commit(
            &self.logical_volumes,
            Table::LogicalVolumes,
            node_id,
            |partition| {
                let lv = partition.get_mut(key).ok_or_else(|| {
                    StoreError::not_found(format!("logical volume {key} on {node_id}"))
                })?;
                *lv.registration_mut() = registration;
                Ok(lv.clone())
            },
        )
    }

    fn list_physical_volumes(&self, node_id: &NodeId) -> Result<Vec<PhysicalVolume>, StoreError> {
        self.read(
            &self.physical_volumes,
            Table::PhysicalVolumes,
            node_id,
            Clone::clone,
        )
    }

    fn list_volume_groups(&self, node_id: &NodeId) -> Result<Vec<VolumeGroup>, StoreError> {
        self.read(
            &self.volume_groups,
            Table::VolumeGroups,
            node_id,
            |partition| partition.values().cloned().collect(),
        )
    }

    fn list_logical_volumes(&self, node_id: &NodeId) -> Result<Vec<LogicalVolume>, StoreError> {
        self.read(
            &self.logical_volumes,
            Table::LogicalVolumes,
            node_id,
            |partition| partition.values().cloned().collect(),
        )
    }

    fn list_disks(&self, node_id: &NodeId) -> Result<Vec<AvailableDisk>, StoreError> {
        self.read(&self.disks, Table::Disks, node_id, Clone::clone)
    }

    fn logical_volume_keys(&self, node_id: &NodeId) -> Result<Vec<LvKey>, StoreError> {
        self.read(
            &self.logical_volumes,
            Table::LogicalVolumes,
            node_id,
            |partition| partition.keys().cloned().collect(),
        )
    }

    fn delete_node(&self, node_id: &NodeId) -> Result<(), StoreError> {
        self.clear(&self.physical_volumes, Table::PhysicalVolumes, node_id)?;
        self.clear(&self.volume_groups, Table::VolumeGroups, node_id)?;
        self.clear(&self.logical_volumes, Table::LogicalVolumes, node_id)?;
        self.clear(&self.disks, Table::Disks, node_id)?;

        if let Some(journal) = &self.journal {
            journal.prune_node_dir(node_id);
        }
        tracing::info!("Removed all topology rows for {node_id}");
        Ok(())
    }
}
