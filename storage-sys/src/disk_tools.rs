// SPDX-License-Identifier: GPL-3.0-only

//! Whole-disk discovery via `lsblk`

use serde::Deserialize;
use storage_types::{ObservedDisk, RawValue};

use crate::command::{run_command, tools_available};
use crate::{Result, SysError};

const LSBLK_COLUMNS: &str = "NAME,PATH,SIZE,MODEL,SERIAL,ROTA,TYPE,MOUNTPOINT,FSTYPE";

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<BlockDevice>,
}

/// `lsblk` prints flags as JSON booleans on util-linux >= 2.33, as "0"/"1" before.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Text(text) => text.trim() == "1",
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockDevice {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    size: Option<RawValue>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    rota: Option<Flag>,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    children: Vec<BlockDevice>,
}

impl BlockDevice {
    fn device_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/dev/{}", self.name))
    }

    fn has_partitions(&self) -> bool {
        self.children.iter().any(|child| child.kind == "part")
    }

    /// Mounted, carries a signature, or has something stacked on it.
    fn in_use(&self) -> bool {
        if self.mountpoint.is_some() || self.fstype.is_some() {
            return true;
        }
        self.children
            .iter()
            .any(|child| child.kind != "part" || child.in_use())
    }
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_lsblk(output: &str) -> Result<Vec<ObservedDisk>> {
    let parsed: LsblkOutput =
        serde_json::from_str(output).map_err(|error| SysError::InvalidOutput {
            command: "lsblk".to_string(),
            reason: error.to_string(),
        })?;

    Ok(parsed
        .blockdevices
        .iter()
        .filter(|device| device.kind == "disk")
        .map(|device| ObservedDisk {
            device_path: device.device_path(),
            size_bytes: device.size.clone(),
            model: trimmed(device.model.as_ref()),
            serial: trimmed(device.serial.as_ref()),
            rotational: device.rota.as_ref().is_some_and(Flag::is_set),
            has_partitions: device.has_partitions(),
            in_use: device.in_use(),
        })
        .collect())
}

/// List whole disks on this host.
pub fn collect_disks() -> Result<Vec<ObservedDisk>> {
    if !cfg!(feature = "lsblk-tools") {
        return Ok(Vec::new());
    }

    if !tools_available(&["lsblk"]) {
        tracing::warn!("lsblk not found - reporting no disks");
        return Ok(Vec::new());
    }

    let output = run_command("lsblk", &["-J", "-b", "-o", LSBLK_COLUMNS])?;
    parse_lsblk(&output)
}

#[cfg(test)]
mod tests {
    use storage_types::parse_bytes;

    use super::*;

    const SAMPLE: &str = r#"{
        "blockdevices": [
            {"name": "sda", "path": "/dev/sda", "size": 500107862016, "model": "Samsung SSD 860 ", "serial": "S3Z9", "rota": false, "type": "disk", "mountpoint": null, "fstype": null,
             "children": [
                {"name": "sda1", "path": "/dev/sda1", "size": 536870912, "model": null, "serial": null, "rota": false, "type": "part", "mountpoint": "/boot/efi", "fstype": "vfat"}
             ]},
            {"name": "sdb", "path": "/dev/sdb", "size": "4000787030016", "model": "WDC WD40", "serial": "WD-1", "rota": "1", "type": "disk", "mountpoint": null, "fstype": null},
            {"name": "sdc", "size": 1000, "rota": true, "type": "disk", "fstype": "LVM2_member"},
            {"name": "sr0", "path": "/dev/sr0", "size": 1073741312, "rota": true, "type": "rom"}
        ]
    }"#;

    #[test]
    fn maps_whole_disks() {
        let disks = parse_lsblk(SAMPLE).unwrap();

        assert_eq!(disks.len(), 3);

        assert_eq!(disks[0].device_path, "/dev/sda");
        assert_eq!(disks[0].model.as_deref(), Some("Samsung SSD 860"));
        assert!(!disks[0].rotational);
        assert!(disks[0].has_partitions);
        assert!(disks[0].in_use);

        assert_eq!(parse_bytes(disks[1].size_bytes.as_ref()), 4000787030016);
        assert!(disks[1].rotational);
        assert!(!disks[1].has_partitions);
        assert!(!disks[1].in_use);

        assert_eq!(disks[2].device_path, "/dev/sdc");
        assert!(disks[2].in_use);
    }

    #[test]
    fn rejects_non_json_output() {
        assert!(matches!(
            parse_lsblk("lsblk: unknown column"),
            Err(SysError::InvalidOutput { .. })
        ));
    }
}
