// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Schema-to-wire mapping for collections.
//!
//! The remote store speaks in flat records: metadata columns (`id`,
//! `updated_at`, `version`, `deleted` and the owner column) next to payload
//! columns. A [`FieldMap`] renames payload fields between their local names
//! and their remote column names; metadata columns are never renamed.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::clock::{from_millis, truncate_ms};
use crate::entity::{Entity, Fields};
use crate::error::{Error, Result};

/// Default name of the owner column.
pub const DEFAULT_OWNER_FIELD: &str = "user_id";

/// Metadata columns that every wire record carries.
pub const METADATA_COLUMNS: [&str; 4] = ["id", "updated_at", "version", "deleted"];

/// Bidirectional rename table between local field names and wire columns.
///
/// Fields without an entry keep their name on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    to_wire: BTreeMap<String, String>,
    to_local: BTreeMap<String, String>,
}

impl FieldMap {
    /// Creates an identity mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rename from a local field to a wire column.
    pub fn rename(mut self, local: impl Into<String>, wire: impl Into<String>) -> Self {
        let (local, wire) = (local.into(), wire.into());
        self.to_local.insert(wire.clone(), local.clone());
        self.to_wire.insert(local, wire);
        self
    }

    /// Returns the wire column for a local field.
    pub fn wire_name<'a>(&'a self, local: &'a str) -> &'a str {
        self.to_wire.get(local).map(String::as_str).unwrap_or(local)
    }

    /// Returns the local field for a wire column.
    pub fn local_name<'a>(&'a self, wire: &'a str) -> &'a str {
        self.to_local.get(wire).map(String::as_str).unwrap_or(wire)
    }

    /// Iterates over `(local, wire)` renames.
    pub fn renames(&self) -> impl Iterator<Item = (&str, &str)> {
        self.to_wire.iter().map(|(l, w)| (l.as_str(), w.as_str()))
    }

    pub fn is_identity(&self) -> bool {
        self.to_wire.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(FieldMap::new(), |map, (l, w)| map.rename(l, w))
    }
}

/// How one collection is laid out on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: String,
    pub owner_field: String,
    pub fields: FieldMap,
}

impl CollectionSchema {
    /// Creates a schema with an identity field mapping.
    pub fn new(name: impl Into<String>, owner_field: impl Into<String>) -> Self {
        CollectionSchema { name: name.into(), owner_field: owner_field.into(), fields: FieldMap::new() }
    }

    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    /// Returns true if `column` is a metadata column for this collection.
    pub fn is_metadata(&self, column: &str) -> bool {
        column == self.owner_field || METADATA_COLUMNS.contains(&column)
    }

    /// Converts an entity into its wire record.
    pub fn to_wire(&self, entity: &Entity) -> Fields {
        let mut record = self.patch_to_wire(&entity.fields);
        record.insert("id".into(), Value::String(entity.id.clone()));
        record.insert("updated_at".into(), Value::String(format_timestamp(entity.updated_at)));
        record.insert("version".into(), Value::from(entity.version));
        record.insert("deleted".into(), Value::Bool(entity.deleted));
        if let Some(owner) = &entity.owner {
            record.insert(self.owner_field.clone(), Value::String(owner.clone()));
        }
        record
    }

    /// Renames the keys of a partial patch to wire columns.
    ///
    /// Metadata keys are dropped; a patch can only touch payload fields.
    pub fn patch_to_wire(&self, patch: &Fields) -> Fields {
        patch
            .iter()
            .map(|(k, v)| (self.fields.wire_name(k).to_string(), v.clone()))
            .filter(|(k, _)| !self.is_metadata(k))
            .collect()
    }

    /// Parses a wire record into an entity.
    ///
    /// Missing `version` defaults to 1 and missing `deleted` to false. A
    /// record without an `id` or with an unparseable `updated_at` is rejected.
    pub fn from_wire(&self, record: &Fields) -> Result<Entity> {
        let id = match record.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "{} record is missing an id",
                    self.name
                )))
            }
        };
        let updated_at = match record.get("updated_at") {
            Some(value) => parse_timestamp(value)?,
            None => {
                return Err(Error::InvalidTimestamp(format!("{} record {id} has no updated_at", self.name)))
            }
        };
        let version = match record.get("version") {
            None | Some(Value::Null) => 1,
            Some(v) => v.as_u64().ok_or_else(|| {
                Error::InvalidInput(format!("{} record {id} has invalid version {v}", self.name))
            })?,
        };
        let deleted = record.get("deleted").and_then(Value::as_bool).unwrap_or(false);
        let owner = record.get(&self.owner_field).and_then(Value::as_str).map(str::to_string);

        let fields = record
            .iter()
            .filter(|(k, _)| !self.is_metadata(k))
            .map(|(k, v)| (self.fields.local_name(k).to_string(), v.clone()))
            .collect();

        Ok(Entity { id, owner, updated_at, version, deleted, fields })
    }
}

/// Per-collection schemas, with a fallback for unregistered collections.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    owner_field: String,
    schemas: HashMap<String, CollectionSchema>,
}

impl SchemaRegistry {
    pub fn new(owner_field: impl Into<String>) -> Self {
        SchemaRegistry { owner_field: owner_field.into(), schemas: HashMap::new() }
    }

    /// Registers a collection with the given field mapping.
    pub fn register(&mut self, name: impl Into<String>, fields: FieldMap) {
        let name = name.into();
        let schema = CollectionSchema::new(name.clone(), self.owner_field.clone()).with_fields(fields);
        self.schemas.insert(name, schema);
    }

    pub fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.schemas.get(name)
    }

    /// Returns the registered schema, or an identity schema for `name`.
    ///
    /// Queued operations can outlive a collection's registration; they are
    /// still replayed with an identity mapping.
    pub fn get_or_identity(&self, name: &str) -> CollectionSchema {
        self.schemas
            .get(name)
            .cloned()
            .unwrap_or_else(|| CollectionSchema::new(name, self.owner_field.clone()))
    }

    pub fn owner_field(&self) -> &str {
        &self.owner_field
    }

    /// Registered collection names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        SchemaRegistry::new(DEFAULT_OWNER_FIELD)
    }
}

/// Formats a timestamp the way it is written to the wire.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 string or epoch-millisecond number.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| truncate_ms(t.with_timezone(&Utc)))
            .map_err(|_| Error::InvalidTimestamp(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(from_millis)
            .ok_or_else(|| Error::InvalidTimestamp(n.to_string())),
        other => Err(Error::InvalidTimestamp(other.to_string())),
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
