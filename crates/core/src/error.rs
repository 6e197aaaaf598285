// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for tend-core operations.

use thiserror::Error;

/// All possible errors that can occur in tend-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error(
        "unknown strategy: '{0}'\n  hint: valid strategies are: local-wins, remote-wins, timestamp-wins, merge"
    )]
    UnknownStrategy(String),

    #[error("invalid operation kind: '{0}'\n  hint: valid kinds are: insert, update, delete")]
    InvalidOpKind(String),

    #[error("invalid timestamp: '{0}'")]
    InvalidTimestamp(String),
}

/// A specialized Result type for tend-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
