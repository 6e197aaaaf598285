// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for tend-sync operations.

use thiserror::Error;

use crate::queue::QueueError;
use crate::realtime::RealtimeError;
use crate::store::RemoteError;

/// All possible errors that can occur in tend-sync operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] tend_core::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown collection: '{0}'\n  hint: add it as a [[collections]] entry in the config")]
    UnknownCollection(String),

    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    #[error("entity not found: {collection}/{id}")]
    EntityNotFound { collection: String, id: String },

    #[error("no active session\n  hint: set user_id in the config or sign in first")]
    NoSession,
}

/// A specialized Result type for tend-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
