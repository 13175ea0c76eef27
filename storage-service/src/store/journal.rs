// SPDX-License-Identifier: GPL-3.0-only

//! On-disk durability for [`SnapshotStore`](super::SnapshotStore).
//!
//! Layout: `<root>/<node>/<table>.json`, one JSON array of rows per file.
//! A table is written to `<table>.json.tmp` and renamed over the previous
//! file, so a reader of the directory sees either the old or the new rows.
//!
//! Every store opened on the same root (the daemon and one-shot CLI calls)
//! coordinates through `<root>/.<table>.lock`: shared `flock` for reads,
//! exclusive for read-modify-write.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use serde::Serialize;
use serde::de::DeserializeOwned;
use storage_contracts::{StoreError, StoreErrorKind};
use storage_types::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Table {
    PhysicalVolumes,
    VolumeGroups,
    LogicalVolumes,
    Disks,
}

impl Table {
    fn file_name(self) -> &'static str {
        match self {
            Self::PhysicalVolumes => "physical_volumes.json",
            Self::VolumeGroups => "volume_groups.json",
            Self::LogicalVolumes => "logical_volumes.json",
            Self::Disks => "disks.json",
        }
    }

    fn lock_name(self) -> &'static str {
        match self {
            Self::PhysicalVolumes => ".physical_volumes.lock",
            Self::VolumeGroups => ".volume_groups.lock",
            Self::LogicalVolumes => ".logical_volumes.lock",
            Self::Disks => ".disks.lock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

/// Held table lock; released on drop.
pub(crate) struct TableLock {
    _flock: Flock<File>,
}

#[derive(Debug, Clone)]
pub(crate) struct Journal {
    root: PathBuf,
}

fn io_error(path: &Path, error: io::Error) -> StoreError {
    StoreError::io(format!("{}: {error}", path.display()))
}

fn decode<R: DeserializeOwned>(path: &Path, raw: &[u8]) -> Result<Vec<R>, StoreError> {
    serde_json::from_slice(raw).map_err(|error| {
        StoreError::new(
            StoreErrorKind::Serialization,
            format!("{}: {error}", path.display()),
        )
    })
}

/// Directory name for a node. Anything outside `[A-Za-z0-9._-]` is
/// percent-encoded so node ids can never escape the root.
fn node_dir_name(node_id: &NodeId) -> String {
    let mut encoded = String::with_capacity(node_id.as_str().len());
    for byte in node_id.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            encoded.push(byte as char);
        } else if byte == b'.' && !encoded.is_empty() {
            encoded.push('.');
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

impl Journal {
    pub(crate) fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|error| io_error(&root, error))?;
        Ok(Self { root })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    fn node_dir(&self, node_id: &NodeId) -> PathBuf {
        self.root.join(node_dir_name(node_id))
    }

    /// Block until `table` is locked across every process sharing the root.
    pub(crate) fn lock(&self, table: Table, mode: LockMode) -> Result<TableLock, StoreError> {
        let path = self.root.join(table.lock_name());
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|error| io_error(&path, error))?;

        let arg = match mode {
            LockMode::Shared => FlockArg::LockShared,
            LockMode::Exclusive => FlockArg::LockExclusive,
        };
        let flock = Flock::lock(file, arg)
            .map_err(|(_, errno)| io_error(&path, io::Error::from(errno)))?;
        Ok(TableLock { _flock: flock })
    }

    /// Current rows of one node's table; a missing file is an empty table.
    pub(crate) fn read_rows<R: DeserializeOwned>(
        &self,
        node_id: &NodeId,
        table: Table,
    ) -> Result<Vec<R>, StoreError> {
        let path = self.node_dir(node_id).join(table.file_name());
        match fs::read(&path) {
            Ok(raw) => decode(&path, &raw),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(io_error(&path, error)),
        }
    }

    pub(crate) fn write<R: Serialize>(
        &self,
        node_id: &NodeId,
        table: Table,
        rows: &[&R],
    ) -> Result<(), StoreError> {
        let dir = self.node_dir(node_id);
        fs::create_dir_all(&dir).map_err(|error| io_error(&dir, error))?;

        let path = dir.join(table.file_name());
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(rows).map_err(|error| {
            StoreError::new(
                StoreErrorKind::Serialization,
                format!("{}: {error}", path.display()),
            )
        })?;

        fs::write(&tmp, content).map_err(|error| io_error(&tmp, error))?;
        fs::rename(&tmp, &path).map_err(|error| io_error(&path, error))
    }

    pub(crate) fn remove_table(&self, node_id: &NodeId, table: Table) -> Result<(), StoreError> {
        let path = self.node_dir(node_id).join(table.file_name());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(io_error(&path, error)),
        }
    }

    /// Remove the node directory once all of its tables are gone.
    pub(crate) fn prune_node_dir(&self, node_id: &NodeId) {
        let dir = self.node_dir(node_id);
        if let Err(error) = fs::remove_dir(&dir)
            && error.kind() != io::ErrorKind::NotFound
        {
            tracing::debug!("Leaving node directory {}: {error}", dir.display());
        }
    }

    /// Read one table for every node directory under the root.
    pub(crate) fn load<R: DeserializeOwned>(&self, table: Table) -> Result<Vec<Vec<R>>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|error| io_error(&self.root, error))?;
        let mut partitions = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|error| io_error(&self.root, error))?;
            let path = entry.path().join(table.file_name());
            if !path.is_file() {
                continue;
            }

            let raw = fs::read(&path).map_err(|error| io_error(&path, error))?;
            partitions.push(decode(&path, &raw)?);
        }

        Ok(partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_dir_names_cannot_escape_the_root() {
        assert_eq!(node_dir_name(&NodeId::new("pve-1")), "pve-1");
        assert_eq!(node_dir_name(&NodeId::new("host.lan")), "host.lan");
        assert_eq!(node_dir_name(&NodeId::new("../etc")), "%2E.%2Fetc");
        assert_eq!(node_dir_name(&NodeId::new("a/b")), "a%2Fb");
    }

    #[test]
    fn missing_table_reads_as_empty() {
        let root = std::env::temp_dir().join(format!("journal-{}", uuid::Uuid::new_v4()));
        let journal = Journal::open(&root).unwrap();
        let node = NodeId::new("pve-1");

        let rows: Vec<String> = journal.read_rows(&node, Table::Disks).unwrap();
        assert!(rows.is_empty());

        {
            let _lock = journal.lock(Table::Disks, LockMode::Exclusive).unwrap();
            journal
                .write(&node, Table::Disks, &[&"/dev/sda".to_string()])
                .unwrap();
        }
        let rows: Vec<String> = journal.read_rows(&node, Table::Disks).unwrap();
        assert_eq!(rows, vec!["/dev/sda".to_string()]);

        // Lock files sit beside node directories and are not tables.
        let loaded: Vec<Vec<String>> = journal.load(Table::Disks).unwrap();
        assert_eq!(loaded.len(), 1);

        fs::remove_dir_all(&root).unwrap();
    }
}
