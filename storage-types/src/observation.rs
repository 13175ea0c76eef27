//! Observation payloads handed over by a collector, one node per sync.
//!
//! Numeric columns are kept as [`RawValue`] so both JSON numbers and the
//! strings printed by the LVM tools deserialize.

use serde::{Deserialize, Serialize};

use crate::{NodeId, RawValue};

/// Full topology of one node as seen at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyObservation {
    pub node_id: NodeId,
    #[serde(default)]
    pub physical_volumes: Vec<ObservedPhysicalVolume>,
    #[serde(default)]
    pub volume_groups: Vec<ObservedVolumeGroup>,
    #[serde(default)]
    pub logical_volumes: Vec<ObservedLogicalVolume>,
    #[serde(default)]
    pub disks: Vec<ObservedDisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedPhysicalVolume {
    pub name: String,
    #[serde(default)]
    pub vg_name: Option<String>,
    #[serde(default)]
    pub size: Option<RawValue>,
    #[serde(default)]
    pub free: Option<RawValue>,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedVolumeGroup {
    pub name: String,
    #[serde(default)]
    pub size: Option<RawValue>,
    #[serde(default)]
    pub free: Option<RawValue>,
    #[serde(default)]
    pub pv_count: Option<RawValue>,
    #[serde(default)]
    pub lv_count: Option<RawValue>,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedLogicalVolume {
    pub name: String,
    pub vg_name: String,
    #[serde(default)]
    pub size: Option<RawValue>,
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub pool_backref: Option<String>,
    #[serde(default)]
    pub thin_pool_fill_percent: Option<RawValue>,
    /// Defaults to `/dev/<vg>/<lv>` when the collector does not report it
    #[serde(default)]
    pub device_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedDisk {
    pub device_path: String,
    #[serde(default)]
    pub size_bytes: Option<RawValue>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub rotational: bool,
    #[serde(default)]
    pub has_partitions: bool,
    #[serde(default)]
    pub in_use: bool,
}
