//! LVM (Logical Volume Manager) types
//!
//! Persisted rows for physical volumes, volume groups and logical volumes,
//! plus the normalized samples a sync cycle produces from one observation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::NodeId;

/// Link from a VG or LV to a "registered storage" entry elsewhere.
///
/// Set only through explicit registration calls; a topology refresh never
/// touches it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Registration {
    pub storage_id: i64,
    pub storage_type: String,
}

impl Registration {
    pub fn new(storage_id: i64, storage_type: impl Into<String>) -> Self {
        Self {
            storage_id,
            storage_type: storage_type.into(),
        }
    }
}

/// Three-way classification of a logical volume.
///
/// Only `Pool` is persisted (as `is_thin_pool`); the thin-volume distinction
/// is recomputed from the stored attribute and pool back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LvClass {
    Pool,
    ThinVolume,
    Regular,
}

impl LvClass {
    /// Classify from the `lv_attr` string and the `pool_lv` column.
    ///
    /// An empty pool back-reference counts as absent. Thin volumes report
    /// type `V` in current LVM releases, older ones a `t` with a pool set.
    pub fn classify(attr: Option<&str>, pool_backref: Option<&str>) -> Self {
        let Some(kind) = attr.and_then(|attr| attr.trim().chars().next()) else {
            return Self::Regular;
        };
        let has_pool = pool_backref.is_some_and(|pool| !pool.trim().is_empty());

        match (kind.to_ascii_lowercase(), has_pool) {
            ('t', false) => Self::Pool,
            ('t' | 'v', true) => Self::ThinVolume,
            _ => Self::Regular,
        }
    }

    pub fn is_thin_pool(self) -> bool {
        self == Self::Pool
    }
}

/// Natural key of a logical volume within a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LvKey {
    pub vg_name: String,
    pub lv_name: String,
}

impl LvKey {
    pub fn new(vg_name: impl Into<String>, lv_name: impl Into<String>) -> Self {
        Self {
            vg_name: vg_name.into(),
            lv_name: lv_name.into(),
        }
    }
}

impl fmt::Display for LvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vg_name, self.lv_name)
    }
}

/// A persisted row that is upsert-merged on every sync.
///
/// `merge` overwrites every observed column from the sample and keeps the
/// internal identifier, the registration pair and `created_at`.
pub trait MergeRow: Sized {
    type Key: Ord + Clone + fmt::Display;
    type Sample;

    fn key(&self) -> Self::Key;
    fn sample_key(sample: &Self::Sample) -> Self::Key;
    fn insert(node_id: &NodeId, sample: Self::Sample, now: DateTime<Utc>) -> Self;
    fn merge(&mut self, sample: Self::Sample, now: DateTime<Utc>);
    fn registration_mut(&mut self) -> &mut Option<Registration>;
}

/// Physical volume row. Replaced wholesale on every sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalVolume {
    pub node_id: NodeId,

    /// Device path (e.g., "/dev/sda1")
    pub name: String,

    /// Volume group name (None if not assigned)
    pub vg_name: Option<String>,

    pub size_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub uuid: Option<String>,
}

impl PhysicalVolume {
    /// Check if this PV is assigned to a VG
    pub fn is_assigned(&self) -> bool {
        self.vg_name.is_some()
    }
}

/// Normalized observation of one volume group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroupSample {
    pub name: String,
    pub size_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub pv_count: u32,
    pub lv_count: u32,
    pub uuid: Option<String>,
}

/// Volume group row, keyed by `(node_id, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroup {
    pub id: Uuid,
    pub node_id: NodeId,
    pub name: String,
    pub size_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub pv_count: u32,
    pub lv_count: u32,
    pub uuid: Option<String>,
    pub registration: Option<Registration>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VolumeGroup {
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    /// Get usage percentage (0-100)
    pub fn usage_percent(&self) -> u32 {
        if self.size_bytes == 0 {
            0
        } else {
            ((self.used_bytes as f64 / self.size_bytes as f64) * 100.0) as u32
        }
    }
}

impl MergeRow for VolumeGroup {
    type Key = String;
    type Sample = VolumeGroupSample;

    fn key(&self) -> String {
        self.name.clone()
    }

    fn sample_key(sample: &VolumeGroupSample) -> String {
        sample.name.clone()
    }

    fn insert(node_id: &NodeId, sample: VolumeGroupSample, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id: node_id.clone(),
            name: sample.name,
            size_bytes: sample.size_bytes,
            free_bytes: sample.free_bytes,
            used_bytes: sample.used_bytes,
            pv_count: sample.pv_count,
            lv_count: sample.lv_count,
            uuid: sample.uuid,
            registration: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn merge(&mut self, sample: VolumeGroupSample, now: DateTime<Utc>) {
        self.name = sample.name;
        self.size_bytes = sample.size_bytes;
        self.free_bytes = sample.free_bytes;
        self.used_bytes = sample.used_bytes;
        self.pv_count = sample.pv_count;
        self.lv_count = sample.lv_count;
        self.uuid = sample.uuid;
        self.updated_at = now;
    }

    fn registration_mut(&mut self) -> &mut Option<Registration> {
        &mut self.registration
    }
}

/// Normalized observation of one logical volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalVolumeSample {
    pub vg_name: String,
    pub name: String,
    pub size_bytes: u64,
    pub device_path: String,
    pub attr: String,
    pub is_thin_pool: bool,
    pub thin_pool_name: Option<String>,
    pub thin_pool_fill_percent: Option<f64>,
}

/// Logical volume row, keyed by `(node_id, vg_name, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalVolume {
    pub id: Uuid,
    pub node_id: NodeId,
    pub vg_name: String,
    pub name: String,
    pub size_bytes: u64,

    /// Device path (e.g., "/dev/vg0/lv0")
    pub device_path: String,

    /// Raw `lv_attr` string as reported by the host
    pub attr: String,

    pub is_thin_pool: bool,

    /// Pool this volume lives in, for thin volumes
    pub thin_pool_name: Option<String>,

    /// Data fill of the pool; only set when `is_thin_pool`
    pub thin_pool_fill_percent: Option<f64>,

    pub registration: Option<Registration>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogicalVolume {
    pub fn lv_key(&self) -> LvKey {
        LvKey::new(&self.vg_name, &self.name)
    }

    pub fn class(&self) -> LvClass {
        LvClass::classify(Some(&self.attr), self.thin_pool_name.as_deref())
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }
}

impl MergeRow for LogicalVolume {
    type Key = LvKey;
    type Sample = LogicalVolumeSample;

    fn key(&self) -> LvKey {
        self.lv_key()
    }

    fn sample_key(sample: &LogicalVolumeSample) -> LvKey {
        LvKey::new(&sample.vg_name, &sample.name)
    }

    fn insert(node_id: &NodeId, sample: LogicalVolumeSample, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id: node_id.clone(),
            vg_name: sample.vg_name,
            name: sample.name,
            size_bytes: sample.size_bytes,
            device_path: sample.device_path,
            attr: sample.attr,
            is_thin_pool: sample.is_thin_pool,
            thin_pool_name: sample.thin_pool_name,
            thin_pool_fill_percent: sample.thin_pool_fill_percent,
            registration: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn merge(&mut self, sample: LogicalVolumeSample, now: DateTime<Utc>) {
        self.vg_name = sample.vg_name;
        self.name = sample.name;
        self.size_bytes = sample.size_bytes;
        self.device_path = sample.device_path;
        self.attr = sample.attr;
        self.is_thin_pool = sample.is_thin_pool;
        self.thin_pool_name = sample.thin_pool_name;
        self.thin_pool_fill_percent = sample.thin_pool_fill_percent;
        self.updated_at = now;
    }

    fn registration_mut(&mut self) -> &mut Option<Registration> {
        &mut self.registration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vg_sample(size: u64, free: u64) -> VolumeGroupSample {
        VolumeGroupSample {
            name: "vg0".to_string(),
            size_bytes: size,
            free_bytes: free,
            used_bytes: size - free,
            pv_count: 1,
            lv_count: 2,
            uuid: Some("vg-uuid".to_string()),
        }
    }

    #[test]
    fn classifies_pools_thin_volumes_and_regular_volumes() {
        assert_eq!(LvClass::classify(Some("twi-a-tz--"), None), LvClass::Pool);
        assert_eq!(LvClass::classify(Some("Twi-a-tz--"), Some("")), LvClass::Pool);
        assert_eq!(
            LvClass::classify(Some("Vwi-a-tz--"), Some("pool0")),
            LvClass::ThinVolume
        );
        assert_eq!(
            LvClass::classify(Some("twi-a-tz--"), Some("pool0")),
            LvClass::ThinVolume
        );
        assert_eq!(LvClass::classify(Some(""), None), LvClass::Regular);
        assert_eq!(LvClass::classify(None, Some("pool0")), LvClass::Regular);
        assert_eq!(LvClass::classify(Some("-wi-ao----"), None), LvClass::Regular);
        assert_eq!(LvClass::classify(Some("Vwi-a-tz--"), None), LvClass::Regular);
    }

    #[test]
    fn only_pools_are_thin_pools() {
        assert!(LvClass::Pool.is_thin_pool());
        assert!(!LvClass::ThinVolume.is_thin_pool());
        assert!(!LvClass::Regular.is_thin_pool());
    }

    #[test]
    fn merge_keeps_identity_and_registration() {
        let node = NodeId::new("node-a");
        let created = Utc::now();
        let mut vg = VolumeGroup::insert(&node, vg_sample(100, 40), created);
        vg.registration = Some(Registration::new(5, "zfs"));
        let id = vg.id;

        let later = created + chrono::Duration::seconds(30);
        vg.merge(vg_sample(200, 50), later);

        assert_eq!(vg.id, id);
        assert_eq!(vg.registration, Some(Registration::new(5, "zfs")));
        assert_eq!(vg.size_bytes, 200);
        assert_eq!(vg.used_bytes, 150);
        assert_eq!(vg.created_at, created);
        assert_eq!(vg.updated_at, later);
        assert_eq!(vg.usage_percent(), 75);
    }

    #[test]
    fn lv_key_displays_as_vg_slash_lv() {
        assert_eq!(LvKey::new("vgA", "lvX").to_string(), "vgA/lvX");
    }
}
