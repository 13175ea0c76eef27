// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use storage_contracts::{StoreError, TopologyStore};
use storage_types::{NodeId, TopologySummary, summarize_topology};

/// Read-only rollups over the current snapshot.
///
/// Only reads committed rows, so it can run while a sync for the same node
/// is in flight; it then sees each entity type either before or after that
/// cycle's write.
pub struct SummaryAggregator<S: ?Sized> {
    store: Arc<S>,
}

impl<S: TopologyStore + ?Sized> SummaryAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn get_summary(&self, node_id: &NodeId) -> Result<TopologySummary, StoreError> {
        let volume_groups = self.store.list_volume_groups(node_id)?;
        let thin_pools = self.store.list_thin_pools(node_id)?;
        let available_disks = self.store.list_available_disks(node_id)?;

        Ok(summarize_topology(
            &volume_groups,
            &thin_pools,
            &available_disks,
        ))
    }
}
