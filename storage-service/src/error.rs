// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::StoreError;
use storage_sys::SysError;
use thiserror::Error;

use crate::config::ConfigError;

/// Service-specific errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Collection failed: {0}")]
    Collection(#[from] SysError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync task failed: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::TaskFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
