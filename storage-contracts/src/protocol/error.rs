// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    NotFound,
    Io,
    Serialization,
    Unavailable,
    Internal,
}

/// Persistence failure, returned to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Io, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_roundtrips() {
        let error = StoreError::not_found("volume group vg0 on node-a");
        let json = serde_json::to_string(&error).expect("serialize error");
        let parsed: StoreError = serde_json::from_str(&json).expect("deserialize error");
        assert_eq!(parsed, error);
        assert!(parsed.is_not_found());
        assert_eq!(parsed.to_string(), "NotFound: volume group vg0 on node-a");
    }
}
