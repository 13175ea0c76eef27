// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for host collection
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Unreadable {command} output: {reason}")]
    InvalidOutput { command: String, reason: String },
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
