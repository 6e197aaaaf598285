// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queued operations for offline mutation tracking.
//!
//! A mutation that could not be confirmed by the remote store is recorded as
//! a [`QueuedOperation`] and replayed later. Replays must be idempotent per
//! entity id: an insert is an upsert, an update carries either the full
//! snapshot or a patch, and a delete is a tombstone write.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{Entity, Fields};
use crate::error::{Error, Result};

/// Unique identifier for a queued operation.
///
/// Distinct from the id of the entity it targets. Ids are UUIDv7 so they
/// sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(Uuid);

impl OpId {
    /// Generates a fresh operation id.
    pub fn new() -> Self {
        OpId(Uuid::now_v7())
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(OpKind::Insert),
            "update" => Ok(OpKind::Update),
            "delete" => Ok(OpKind::Delete),
            _ => Err(Error::InvalidOpKind(s.to_string())),
        }
    }
}

/// What an operation carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpPayload {
    /// The full entity after the mutation.
    Snapshot { entity: Entity },
    /// A partial change to payload fields of one entity.
    Patch { id: String, fields: Fields },
}

impl OpPayload {
    /// Returns the id of the targeted entity.
    pub fn entity_id(&self) -> &str {
        match self {
            OpPayload::Snapshot { entity } => &entity.id,
            OpPayload::Patch { id, .. } => id,
        }
    }

    pub fn snapshot(entity: Entity) -> Self {
        OpPayload::Snapshot { entity }
    }

    pub fn patch(id: impl Into<String>, fields: Fields) -> Self {
        OpPayload::Patch { id: id.into(), fields }
    }
}

/// A pending mutation awaiting transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: OpId,
    pub collection: String,
    pub kind: OpKind,
    pub payload: OpPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedOperation {
    /// Creates an operation with a fresh id, enqueued at `now`.
    pub fn new(collection: impl Into<String>, kind: OpKind, payload: OpPayload, now: DateTime<Utc>) -> Self {
        QueuedOperation { id: OpId::new(), collection: collection.into(), kind, payload, enqueued_at: now }
    }

    /// Returns the id of the targeted entity.
    pub fn entity_id(&self) -> &str {
        self.payload.entity_id()
    }
}

#[cfg(test)]
#[path = "op_tests.rs"]
mod tests;
