// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronizable records.
//!
//! An [`Entity`] is a record in some collection, carrying the metadata the
//! sync engine needs: a client-generated `id`, a `version` counter, an
//! `updated_at` timestamp and a `deleted` tombstone flag. Everything else
//! lives in `fields`, which the engine treats as an opaque JSON object.
//!
//! Lifecycle:
//! - created with `version = 1`
//! - every mutation bumps `version` and advances `updated_at`
//! - deletion sets `deleted = true` and is itself a mutation
//!
//! `version` never decreases and `updated_at` never regresses for a given id.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::truncate_ms;

/// Domain payload of an entity.
pub type Fields = serde_json::Map<String, Value>;

/// A synchronizable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable client-generated identifier.
    pub id: String,
    /// Owning user, supplied by the session provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub fields: Fields,
}

impl Entity {
    /// Creates a fresh entity at `version = 1`.
    pub fn new(id: impl Into<String>, fields: Fields, now: DateTime<Utc>) -> Self {
        Entity {
            id: id.into(),
            owner: None,
            updated_at: truncate_ms(now),
            version: 1,
            deleted: false,
            fields,
        }
    }

    /// Generates a new time-ordered entity id.
    pub fn generate_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }

    /// Sets the owning user.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets a single payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns a payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns the entity after one more mutation at `now`.
    ///
    /// `updated_at` becomes `max(now, updated_at + 1ms)` so a clock that
    /// stalls or steps backwards still yields a strictly newer timestamp.
    pub fn bump(&self, now: DateTime<Utc>) -> Entity {
        let floor = self.updated_at + Duration::milliseconds(1);
        Entity {
            version: self.version.saturating_add(1),
            updated_at: truncate_ms(now).max(floor),
            ..self.clone()
        }
    }

    /// Returns the deleted form of the entity.
    ///
    /// Tombstoning is a mutation, so the result is also bumped.
    pub fn tombstone(&self, now: DateTime<Utc>) -> Entity {
        let mut deleted = self.clone();
        deleted.deleted = true;
        deleted.bump(now)
    }

    /// Overlays `patch` onto the payload without touching metadata.
    pub fn patched(&self, patch: &Fields) -> Entity {
        let mut patched = self.clone();
        for (key, value) in patch {
            patched.fields.insert(key.clone(), value.clone());
        }
        patched
    }

    /// Compares payload and tombstone state, ignoring `version`, `updated_at`
    /// and `owner`.
    ///
    /// A field holding `null` is the same as an absent field.
    pub fn same_payload(&self, other: &Entity) -> bool {
        self.id == other.id
            && self.deleted == other.deleted
            && defined_fields(&self.fields) == defined_fields(&other.fields)
    }

    /// Returns true if this entity is a later revision than `other`.
    pub fn is_newer_than(&self, other: &Entity) -> bool {
        (self.updated_at, self.version) > (other.updated_at, other.version)
    }

    /// Raises `version` and `updated_at` to at least the given values.
    ///
    /// Used when adopting one side of a conflict so the result never lands
    /// behind either replica.
    pub fn raised_to(mut self, version: u64, updated_at: DateTime<Utc>) -> Entity {
        self.version = self.version.max(version);
        self.updated_at = self.updated_at.max(updated_at);
        self
    }
}

fn defined_fields(fields: &Fields) -> Vec<(&String, &Value)> {
    let mut defined: Vec<_> = fields.iter().filter(|(_, v)| !v.is_null()).collect();
    defined.sort_by(|a, b| a.0.cmp(b.0));
    defined
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
