// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict resolution between a local and a remote copy of one entity.
//!
//! Resolution rules:
//! - `local-wins`: the local copy overwrites the remote one
//! - `remote-wins`: the remote copy replaces the local one, no remote write
//! - `timestamp-wins`: the strictly newer `updated_at` wins; equal timestamps
//!   are a tie, broken by the higher `version`, then by the remote copy
//! - `merge`: start from the remote payload and overlay every non-null local
//!   field; the result is bumped and always written back to the remote
//!
//! The resolved entity never carries a lower `version` or an older
//! `updated_at` than either input.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{Error, Result};

/// Configured conflict resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    LocalWins,
    RemoteWins,
    #[default]
    TimestampWins,
    Merge,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::LocalWins => "local-wins",
            Strategy::RemoteWins => "remote-wins",
            Strategy::TimestampWins => "timestamp-wins",
            Strategy::Merge => "merge",
        }
    }

    /// Resolves a differing pair of copies of the same entity.
    ///
    /// `now` is only consulted by `merge`, which produces a new revision.
    pub fn resolve(&self, local: &Entity, remote: &Entity, now: DateTime<Utc>) -> Resolution {
        let version = local.version.max(remote.version);
        let updated_at = local.updated_at.max(remote.updated_at);

        let (winner, tie) = match self {
            Strategy::LocalWins => (Winner::Local, false),
            Strategy::RemoteWins => (Winner::Remote, false),
            Strategy::Merge => (Winner::Merged, false),
            Strategy::TimestampWins => match local.updated_at.cmp(&remote.updated_at) {
                std::cmp::Ordering::Greater => (Winner::Local, false),
                std::cmp::Ordering::Less => (Winner::Remote, false),
                std::cmp::Ordering::Equal if local.version > remote.version => (Winner::Local, true),
                std::cmp::Ordering::Equal => (Winner::Remote, true),
            },
        };

        let entity = match winner {
            Winner::Local => {
                let mut entity = local.clone().raised_to(version, updated_at);
                entity.owner = local.owner.clone().or_else(|| remote.owner.clone());
                entity
            }
            Winner::Remote => {
                let mut entity = remote.clone().raised_to(version, updated_at);
                entity.owner = remote.owner.clone().or_else(|| local.owner.clone());
                entity
            }
            Winner::Merged => merge_fields(local, remote).raised_to(version, updated_at).bump(now),
        };

        Resolution { entity, winner, tie }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "local-wins" => Ok(Strategy::LocalWins),
            "remote-wins" => Ok(Strategy::RemoteWins),
            "timestamp-wins" => Ok(Strategy::TimestampWins),
            "merge" => Ok(Strategy::Merge),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// Which copy a resolution kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Local,
    Remote,
    Merged,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Local => "local",
            Winner::Remote => "remote",
            Winner::Merged => "merged",
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Winner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Winner::Local),
            "remote" => Ok(Winner::Remote),
            "merged" => Ok(Winner::Merged),
            _ => Err(Error::CorruptedData(format!("unknown conflict winner '{s}'"))),
        }
    }
}

/// The outcome of resolving one conflict candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The single entity both replicas should converge on.
    pub entity: Entity,
    pub winner: Winner,
    /// Both copies had the same `updated_at`.
    pub tie: bool,
}

impl Resolution {
    /// Returns true if the resolved entity must be written to the remote store.
    pub fn needs_remote_write(&self) -> bool {
        self.winner != Winner::Remote
    }
}

/// Audit record of a resolved conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub collection: String,
    pub entity_id: String,
    pub strategy: Strategy,
    pub winner: Winner,
    pub tie: bool,
    pub local_updated_at: DateTime<Utc>,
    pub remote_updated_at: DateTime<Utc>,
    pub resolved_at: DateTime<Utc>,
}

impl ConflictRecord {
    pub fn new(
        collection: impl Into<String>,
        local: &Entity,
        remote: &Entity,
        strategy: Strategy,
        resolution: &Resolution,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        ConflictRecord {
            collection: collection.into(),
            entity_id: local.id.clone(),
            strategy,
            winner: resolution.winner,
            tie: resolution.tie,
            local_updated_at: local.updated_at,
            remote_updated_at: remote.updated_at,
            resolved_at,
        }
    }
}

/// Field-level union: remote payload with every non-null local field on top.
///
/// A tombstone on either side survives the merge.
fn merge_fields(local: &Entity, remote: &Entity) -> Entity {
    let mut merged = remote.clone();
    for (key, value) in &local.fields {
        if !value.is_null() {
            merged.fields.insert(key.clone(), value.clone());
        }
    }
    merged.deleted = local.deleted || remote.deleted;
    merged.owner = remote.owner.clone().or_else(|| local.owner.clone());
    merged
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
