// SPDX-License-Identifier: GPL-3.0-only

pub mod topology;

pub use topology::{TopologyStore, UpsertOutcome};
