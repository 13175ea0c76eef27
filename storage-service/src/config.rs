// SPDX-License-Identifier: GPL-3.0-only

//! Service configuration, read from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use storage_types::NodeId;
use thiserror::Error;

use crate::reconcile::VolumeGroupPruning;

pub const CONFIG_ENV: &str = "STORAGE_TOPOLOGY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/storage-topology/config.toml";
pub const DEFAULT_STATE_DIR: &str = "/var/lib/storage-topology";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("invalid config {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Identifier this host's topology is stored under
    pub node_id: Option<String>,
    pub state_dir: PathBuf,
    pub poll_interval_secs: u64,
    /// Drop persisted volume groups the host no longer reports
    pub prune_missing_volume_groups: bool,
    pub collect_disks: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            poll_interval_secs: 60,
            prune_missing_volume_groups: false,
            collect_disks: true,
        }
    }
}

impl ServiceConfig {
    /// Load from `path`, else `$STORAGE_TOPOLOGY_CONFIG`, else the default
    /// path if it exists, else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        if let Ok(value) = std::env::var(CONFIG_ENV)
            && !value.trim().is_empty()
        {
            return Self::from_file(Path::new(&value));
        }

        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::from_file(default_path);
        }

        tracing::debug!("No config file found, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let config = Self::from_toml(&raw).map_err(|error| match error {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|error| ConfigError::Parse {
            path: PathBuf::new(),
            reason: error.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self
            .node_id
            .as_deref()
            .is_some_and(|node_id| node_id.trim().is_empty())
        {
            return Err(ConfigError::Invalid("node_id must not be empty".to_string()));
        }

        Ok(())
    }

    /// Configured node id, else this host's name.
    pub fn node_id(&self) -> NodeId {
        if let Some(node_id) = &self.node_id {
            return NodeId::new(node_id.trim());
        }

        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .map(NodeId::new)
            .unwrap_or_default()
    }

    pub fn volume_group_pruning(&self) -> VolumeGroupPruning {
        if self.prune_missing_volume_groups {
            VolumeGroupPruning::Prune
        } else {
            VolumeGroupPruning::Retain
        }
    }
}
