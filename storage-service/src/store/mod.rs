// SPDX-License-Identifier: GPL-3.0-only

//! Topology snapshot persistence

mod journal;
mod snapshot;

pub use snapshot::SnapshotStore;
