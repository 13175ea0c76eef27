//! Unpartitioned / candidate disk rows

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// A whole disk seen on a node. Replaced wholesale on every sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableDisk {
    pub node_id: NodeId,

    /// Device path (e.g., "/dev/sdb")
    pub device_path: String,

    pub size_bytes: u64,
    pub model: Option<String>,
    pub serial: Option<String>,

    /// Spinning media
    pub rotational: bool,

    pub has_partitions: bool,

    /// Mounted, carrying a signature, or otherwise claimed
    pub in_use: bool,
}

impl AvailableDisk {
    pub fn is_available(&self) -> bool {
        !self.in_use
    }
}
