// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed local storage for cached collections.
//!
//! The [`LocalStore`] keeps every entity the client knows about, tombstones
//! included, plus per-(collection, owner) sync metadata and an audit log of
//! resolved conflicts.
//!
//! Writes are guarded: an entity is never replaced by an older revision
//! (lower `version` or earlier `updated_at`), so a reconciliation result can
//! not clobber a local edit that landed while the run was in flight.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tend_core::schema::format_timestamp;
use tend_core::{ConflictRecord, Entity, Fields};

use crate::error::Result;

/// SQL schema for the local cache.
pub const SCHEMA: &str = r#"
-- Cached entities, one row per (collection, id); deletes are tombstones
CREATE TABLE IF NOT EXISTS entities (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    owner TEXT,
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    fields TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);

-- Last successful reconciliation per collection and owner
CREATE TABLE IF NOT EXISTS sync_meta (
    collection TEXT NOT NULL,
    owner TEXT NOT NULL,
    last_synced_at TEXT NOT NULL,
    PRIMARY KEY (collection, owner)
);

-- Resolved conflicts (audit trail)
CREATE TABLE IF NOT EXISTS sync_conflicts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    strategy TEXT NOT NULL,
    winner TEXT NOT NULL,
    tie INTEGER NOT NULL DEFAULT 0,
    local_updated_at TEXT NOT NULL,
    remote_updated_at TEXT NOT NULL,
    resolved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_owner ON entities(collection, owner);
CREATE INDEX IF NOT EXISTS idx_conflicts_resolved ON sync_conflicts(resolved_at DESC);
"#;

/// Wraps a parse failure into a rusqlite conversion error.
fn corrupted(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(tend_core::Error::CorruptedData(format!("invalid value '{value}' in column '{column}'"))),
    )
}

/// Parse a string value from the database, returning a rusqlite error on parse failure.
fn parse_db<T: std::str::FromStr>(value: &str, column: &str) -> std::result::Result<T, rusqlite::Error> {
    value.parse().map_err(|_| corrupted(column, value))
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(value: &str, column: &str) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupted(column, value))
}

fn entity_from_row(row: &Row<'_>) -> std::result::Result<Entity, rusqlite::Error> {
    let version: i64 = row.get(2)?;
    let updated_str: String = row.get(3)?;
    let fields_str: String = row.get(5)?;
    let fields: Fields = serde_json::from_str(&fields_str).map_err(|_| corrupted("fields", &fields_str))?;

    Ok(Entity {
        id: row.get(0)?,
        owner: row.get(1)?,
        version: u64::try_from(version).unwrap_or(0),
        updated_at: parse_timestamp(&updated_str, "updated_at")?,
        deleted: row.get(4)?,
        fields,
    })
}

/// Returns true if `incoming` may replace `stored`.
fn supersedes(incoming: &Entity, stored: &Entity) -> bool {
    incoming.version >= stored.version && incoming.updated_at >= stored.updated_at
}

const ENTITY_COLUMNS: &str = "id, owner, version, updated_at, deleted, fields";

/// Durable local storage for entities and sync metadata.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Open a store at the given path, creating and migrating if needed.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(LocalStore { conn: Mutex::new(conn) })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(LocalStore { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get one entity, tombstones included.
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Entity>> {
        let conn = self.conn();
        let entity = conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE collection = ?1 AND id = ?2"),
                params![collection, id],
                entity_from_row,
            )
            .optional()?;
        Ok(entity)
    }

    /// List a collection, tombstones included, ordered by id.
    ///
    /// With an owner, only that owner's entities are returned.
    pub fn list(&self, collection: &str, owner: Option<&str>) -> Result<Vec<Entity>> {
        let conn = self.conn();
        let entities = match owner {
            Some(owner) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities WHERE collection = ?1 AND owner = ?2 ORDER BY id"
                ))?;
                let rows = stmt.query_map(params![collection, owner], entity_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE collection = ?1 ORDER BY id"))?;
                let rows = stmt.query_map(params![collection], entity_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(entities)
    }

    /// List entities that are not tombstoned.
    pub fn list_live(&self, collection: &str, owner: Option<&str>) -> Result<Vec<Entity>> {
        Ok(self.list(collection, owner)?.into_iter().filter(|e| !e.deleted).collect())
    }

    /// Store an entity unless an equal-or-newer revision is already stored.
    ///
    /// Returns true if the row was written.
    pub fn put(&self, collection: &str, entity: &Entity) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let written = put_guarded(&tx, collection, entity)?;
        tx.commit()?;
        Ok(written)
    }

    /// Store many entities in one transaction. Returns how many were written.
    pub fn put_all(&self, collection: &str, entities: &[Entity]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut written = 0;
        for entity in entities {
            if put_guarded(&tx, collection, entity)? {
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// When `owner` last completed a reconciliation of `collection`.
    pub fn last_synced_at(&self, collection: &str, owner: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let value: Option<String> = conn
            .query_row(
                "SELECT last_synced_at FROM sync_meta WHERE collection = ?1 AND owner = ?2",
                params![collection, owner],
                |row| row.get(0),
            )
            .optional()?;
        match value {
            Some(s) => Ok(Some(parse_timestamp(&s, "last_synced_at")?)),
            None => Ok(None),
        }
    }

    pub fn set_last_synced_at(&self, collection: &str, owner: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sync_meta (collection, owner, last_synced_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, owner) DO UPDATE SET last_synced_at = excluded.last_synced_at",
            params![collection, owner, format_timestamp(at)],
        )?;
        Ok(())
    }

    /// Append a resolved conflict to the audit log.
    pub fn record_conflict(&self, record: &ConflictRecord) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sync_conflicts (collection, entity_id, strategy, winner, tie,
             local_updated_at, remote_updated_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.collection,
                record.entity_id,
                record.strategy.as_str(),
                record.winner.as_str(),
                record.tie,
                format_timestamp(record.local_updated_at),
                format_timestamp(record.remote_updated_at),
                format_timestamp(record.resolved_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recently resolved conflicts, newest first.
    pub fn list_conflicts(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT collection, entity_id, strategy, winner, tie, local_updated_at,
                    remote_updated_at, resolved_at
             FROM sync_conflicts ORDER BY resolved_at DESC, id DESC LIMIT ?1",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![limit_i64], |row| {
                let strategy_str: String = row.get(2)?;
                let winner_str: String = row.get(3)?;
                let local_str: String = row.get(5)?;
                let remote_str: String = row.get(6)?;
                let resolved_str: String = row.get(7)?;
                Ok(ConflictRecord {
                    collection: row.get(0)?,
                    entity_id: row.get(1)?,
                    strategy: parse_db(&strategy_str, "strategy")?,
                    winner: parse_db(&winner_str, "winner")?,
                    tie: row.get(4)?,
                    local_updated_at: parse_timestamp(&local_str, "local_updated_at")?,
                    remote_updated_at: parse_timestamp(&remote_str, "remote_updated_at")?,
                    resolved_at: parse_timestamp(&resolved_str, "resolved_at")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

fn put_guarded(conn: &Connection, collection: &str, entity: &Entity) -> Result<bool> {
    let stored = conn
        .query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE collection = ?1 AND id = ?2"),
            params![collection, entity.id],
            entity_from_row,
        )
        .optional()?;

    if let Some(stored) = stored {
        let unchanged = stored.same_payload(entity)
            && stored.version == entity.version
            && stored.updated_at == entity.updated_at
            && (entity.owner.is_none() || stored.owner == entity.owner);
        if unchanged || !supersedes(entity, &stored) {
            return Ok(false);
        }
    }

    conn.execute(
        "INSERT INTO entities (collection, id, owner, version, updated_at, deleted, fields)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(collection, id) DO UPDATE SET
             owner = COALESCE(excluded.owner, entities.owner),
             version = excluded.version,
             updated_at = excluded.updated_at,
             deleted = excluded.deleted,
             fields = excluded.fields",
        params![
            collection,
            entity.id,
            entity.owner,
            i64::try_from(entity.version).unwrap_or(i64::MAX),
            format_timestamp(entity.updated_at),
            entity.deleted,
            serde_json::to_string(&entity.fields)?,
        ],
    )?;
    Ok(true)
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
