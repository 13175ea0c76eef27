// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use storage_contracts::TopologyStore;
use storage_types::{NodeId, TopologyObservation};

use crate::error::{Result, ServiceError};
use crate::reconcile::{Reconciler, SyncReport};

/// Serializes sync cycles per node.
///
/// Cycles for the same node queue on that node's lock; cycles for different
/// nodes run side by side on the blocking pool.
pub struct SyncCoordinator<S: ?Sized> {
    reconciler: Arc<Reconciler<S>>,
    node_locks: Mutex<HashMap<NodeId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: TopologyStore + ?Sized + 'static> SyncCoordinator<S> {
    pub fn new(reconciler: Reconciler<S>) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            node_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    fn node_lock(&self, node_id: &NodeId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .node_locks
            .lock()
            .map_err(|_| ServiceError::TaskFailed("node lock table poisoned".to_string()))?;
        Ok(locks.entry(node_id.clone()).or_default().clone())
    }

    /// Run one cycle for the observation's node.
    ///
    /// The node guard travels with the blocking task, so dropping this future
    /// mid-cycle keeps the node locked until the cycle has actually finished.
    pub async fn sync(&self, observation: TopologyObservation) -> Result<SyncReport> {
        let guard = self
            .node_lock(&observation.node_id)?
            .lock_owned()
            .await;

        let reconciler = Arc::clone(&self.reconciler);
        let report = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            reconciler.sync(&observation)
        })
        .await??;
        Ok(report)
    }

    /// Delete every row of a decommissioned node and stop tracking it.
    pub async fn teardown(&self, node_id: NodeId) -> Result<()> {
        let guard = self.node_lock(&node_id)?.lock_owned().await;

        let reconciler = Arc::clone(&self.reconciler);
        let target = node_id.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            reconciler.store().delete_node(&target)
        })
        .await??;

        self.forget(&node_id)?;
        Ok(())
    }

    /// Drop the lock entry of a node nobody is syncing. Returns whether the
    /// entry was removed; a node with a queued or running cycle is kept.
    pub fn forget(&self, node_id: &NodeId) -> Result<bool> {
        let mut locks = self
            .node_locks
            .lock()
            .map_err(|_| ServiceError::TaskFailed("node lock table poisoned".to_string()))?;

        match locks.get(node_id) {
            Some(lock) if Arc::strong_count(lock) == 1 => {
                locks.remove(node_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use storage_contracts::{StoreError, UpsertOutcome};
    use storage_types::{
        AvailableDisk, LogicalVolume, LogicalVolumeSample, LvKey, ObservedLogicalVolume,
        PhysicalVolume, RawValue, Registration, VolumeGroup, VolumeGroupSample,
    };

    use super::*;
    use crate::store::SnapshotStore;

    /// Slows down the first step of a cycle and records overlapping cycles.
    #[derive(Default)]
    struct SlowStore {
        inner: SnapshotStore,
        active: AtomicUsize,
        overlapped: AtomicBool,
    }

    impl TopologyStore for SlowStore {
        fn replace_physical_volumes(
            &self,
            node_id: &NodeId,
            volumes: Vec<PhysicalVolume>,
        ) -> std::result::Result<(), StoreError> {
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(300));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.replace_physical_volumes(node_id, volumes)
        }

        fn replace_disks(
            &self,
            node_id: &NodeId,
            disks: Vec<AvailableDisk>,
        ) -> std::result::Result<(), StoreError> {
            self.inner.replace_disks(node_id, disks)
        }

        fn upsert_volume_groups(
            &self,
            node_id: &NodeId,
            samples: Vec<VolumeGroupSample>,
        ) -> std::result::Result<UpsertOutcome, StoreError> {
            self.inner.upsert_volume_groups(node_id, samples)
        }

        fn upsert_logical_volumes(
            &self,
            node_id: &NodeId,
            samples: Vec<LogicalVolumeSample>,
        ) -> std::result::Result<UpsertOutcome, StoreError> {
            self.inner.upsert_logical_volumes(node_id, samples)
        }

        fn delete_volume_groups(
            &self,
            node_id: &NodeId,
            names: &[String],
        ) -> std::result::Result<usize, StoreError> {
            self.inner.delete_volume_groups(node_id, names)
        }

        fn delete_logical_volumes(
            &self,
            node_id: &NodeId,
            keys: &[LvKey],
        ) -> std::result::Result<usize, StoreError> {
            self.inner.delete_logical_volumes(node_id, keys)
        }

        fn set_volume_group_registration(
            &self,
            node_id: &NodeId,
            vg_name: &str,
            registration: Option<Registration>,
        ) -> std::result::Result<VolumeGroup, StoreError> {
            self.inner
                .set_volume_group_registration(node_id, vg_name, registration)
        }

        fn set_logical_volume_registration(
            &self,
            node_id: &NodeId,
            key: &LvKey,
            registration: Option<Registration>,
        ) -> std::result::Result<LogicalVolume, StoreError> {
            self.inner
                .set_logical_volume_registration(node_id, key, registration)
        }

        fn list_physical_volumes(
            &self,
            node_id: &NodeId,
        ) -> std::result::Result<Vec<PhysicalVolume>, StoreError> {
            self.inner.list_physical_volumes(node_id)
        }

        fn list_volume_groups(
            &self,
            node_id: &NodeId,
        ) -> std::result::Result<Vec<VolumeGroup>, StoreError> {
            self.inner.list_volume_groups(node_id)
        }

        fn list_logical_volumes(
            &self,
            node_id: &NodeId,
        ) -> std::result::Result<Vec<LogicalVolume>, StoreError> {
            self.inner.list_logical_volumes(node_id)
        }

        fn list_disks(
            &self,
            node_id: &NodeId,
        ) -> std::result::Result<Vec<AvailableDisk>, StoreError> {
            self.inner.list_disks(node_id)
        }

        fn delete_node(&self, node_id: &NodeId) -> std::result::Result<(), StoreError> {
            self.inner.delete_node(node_id)
        }
    }

    fn observation(node: &str, lvs: &[&str]) -> TopologyObservation {
        TopologyObservation {
            node_id: NodeId::new(node),
            logical_volumes: lvs
                .iter()
                .map(|name| ObservedLogicalVolume {
                    name: name.to_string(),
                    vg_name: "vg0".to_string(),
                    size: Some(RawValue::from("10B")),
                    attr: Some("-wi-a-----".to_string()),
                    pool_backref: None,
                    thin_pool_fill_percent: None,
                    device_path: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn same_node_cycles_apply_in_order() {
        let store = Arc::new(SnapshotStore::in_memory());
        let coordinator = Arc::new(SyncCoordinator::new(Reconciler::new(store.clone())));

        let mut handles = Vec::new();
        for round in 0..8 {
            let coordinator = coordinator.clone();
            let lv = format!("lv{round}");
            handles.push(tokio::spawn(async move {
                coordinator.sync(observation("node-a", &[lv.as_str()])).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Whichever cycle ran last, exactly its single LV survives.
        let lvs = store.list_logical_volumes(&NodeId::new("node-a")).unwrap();
        assert_eq!(lvs.len(), 1);
    }

    #[tokio::test]
    async fn nodes_sync_independently() {
        let store = Arc::new(SnapshotStore::in_memory());
        let coordinator = SyncCoordinator::new(Reconciler::new(store.clone()));

        coordinator
            .sync(observation("node-a", &["root", "swap"]))
            .await
            .unwrap();
        let report = coordinator
            .sync(observation("node-b", &["data"]))
            .await
            .unwrap();

        assert_eq!(report.logical_volumes.inserted, 1);
        assert_eq!(report.logical_volumes_pruned, 0);
        assert_eq!(
            store.list_logical_volumes(&NodeId::new("node-a")).unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn cancelled_cycle_keeps_the_node_locked() {
        let store = Arc::new(SlowStore::default());
        let coordinator = Arc::new(SyncCoordinator::new(Reconciler::new(store.clone())));

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.sync(observation("node-a", &["root"])).await })
        };
        // Let the first cycle reach the blocking pool, then drop its future.
        tokio::time::sleep(Duration::from_millis(100)).await;
        first.abort();
        let _ = first.await;

        coordinator
            .sync(observation("node-a", &["root"]))
            .await
            .unwrap();

        assert!(!store.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn teardown_forgets_the_node() {
        let store = Arc::new(SnapshotStore::in_memory());
        let coordinator = SyncCoordinator::new(Reconciler::new(store.clone()));
        let node = NodeId::new("node-a");

        coordinator
            .sync(observation("node-a", &["root"]))
            .await
            .unwrap();
        assert!(coordinator.node_locks.lock().unwrap().contains_key(&node));

        coordinator.teardown(node.clone()).await.unwrap();

        assert!(store.list_logical_volumes(&node).unwrap().is_empty());
        assert!(!coordinator.node_locks.lock().unwrap().contains_key(&node));
    }

    #[test]
    fn forget_keeps_a_node_in_use() {
        let store = Arc::new(SnapshotStore::in_memory());
        let coordinator = SyncCoordinator::new(Reconciler::new(store));
        let node = NodeId::new("node-a");

        let held = coordinator.node_lock(&node).unwrap();
        assert!(!coordinator.forget(&node).unwrap());

        drop(held);
        assert!(coordinator.forget(&node).unwrap());
        assert!(!coordinator.forget(&node).unwrap());
    }
}
