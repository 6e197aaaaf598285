// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Configuration is a TOML file:
//!
//! ```toml
//! user_id = "u1"
//!
//! [remote]
//! url = "https://example.test/rest/v1"
//! api_key = "..."
//!
//! [realtime]
//! url = "wss://example.test/realtime"
//!
//! [sync]
//! interval_secs = 300
//! strategy = "timestamp-wins"
//! remote_only = "pull-hydrate"
//!
//! [[collections]]
//! name = "tasks"
//! strategy = "merge"
//! fields = { title = "task_title" }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tend_core::schema::{DEFAULT_OWNER_FIELD, METADATA_COLUMNS};
use tend_core::{FieldMap, SchemaRegistry, Strategy};

use crate::error::{Error, Result};
use crate::orchestrator::SyncSettings;
use crate::reconcile::RemoteOnlyPolicy;

const STATE_DIR_NAME: &str = "tend";
const DB_FILE_NAME: &str = "tend.db";
const QUEUE_FILE_NAME: &str = "queue.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Owner of the daemon's session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Where the local database and queue live (default: platform data dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    pub remote: RemoteConfig,
    /// Push channel; polling only when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime: Option<RealtimeConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the REST collection store (`http://` or `https://`).
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Column holding the owning user id (default: "user_id").
    #[serde(default = "default_owner_field")]
    pub owner_field: String,
    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Periodic sync interval in seconds (default: 300).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Connectivity check interval in seconds (default: 60).
    #[serde(default = "default_connectivity_interval_secs")]
    pub connectivity_interval_secs: u64,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub remote_only: RemoteOnlyPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            interval_secs: default_interval_secs(),
            connectivity_interval_secs: default_connectivity_interval_secs(),
            strategy: Strategy::default(),
            remote_only: RemoteOnlyPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Overrides `sync.strategy` for this collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    /// Local field name to wire column renames.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

fn default_owner_field() -> String {
    DEFAULT_OWNER_FIELD.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    300
}

fn default_connectivity_interval_secs() -> u64 {
    60
}

impl Config {
    /// Loads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parses and validates a TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        if let Some(problem) = config.validate() {
            return Err(Error::Config(problem));
        }
        Ok(config)
    }

    /// Returns a description of the first problem found, if any.
    pub fn validate(&self) -> Option<String> {
        let url = &self.remote.url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Some(format!("invalid remote url '{url}': must be http:// or https://"));
        }
        if let Some(realtime) = &self.realtime {
            if !(realtime.url.starts_with("ws://") || realtime.url.starts_with("wss://")) {
                return Some(format!("invalid realtime url '{}': must be ws:// or wss://", realtime.url));
            }
        }
        if self.remote.owner_field.trim().is_empty() {
            return Some("remote.owner_field must not be empty".to_string());
        }
        if self.remote.timeout_secs == 0 {
            return Some("remote.timeout_secs must be positive".to_string());
        }
        if self.sync.interval_secs == 0 || self.sync.connectivity_interval_secs == 0 {
            return Some("sync intervals must be positive".to_string());
        }
        if self.collections.is_empty() {
            return Some("no collections configured: add at least one [[collections]] entry".to_string());
        }

        let mut seen = HashSet::new();
        for collection in &self.collections {
            let name = collection.name.as_str();
            let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Some(format!("invalid collection name '{name}'"));
            }
            if !seen.insert(name) {
                return Some(format!("collection '{name}' is configured twice"));
            }
            for (local, wire) in &collection.fields {
                for column in [local, wire] {
                    if METADATA_COLUMNS.contains(&column.as_str()) || *column == self.remote.owner_field {
                        return Some(format!("collection '{name}' cannot rename metadata column '{column}'"));
                    }
                }
            }
        }
        None
    }

    /// Schema registry for the configured collections.
    pub fn schemas(&self) -> SchemaRegistry {
        let mut registry = SchemaRegistry::new(self.remote.owner_field.clone());
        for collection in &self.collections {
            let fields: FieldMap = collection.fields.iter().map(|(l, w)| (l.as_str(), w.as_str())).collect();
            registry.register(collection.name.clone(), fields);
        }
        registry
    }

    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            sync_interval: Duration::from_secs(self.sync.interval_secs),
            connectivity_interval: Duration::from_secs(self.sync.connectivity_interval_secs),
            strategy: self.sync.strategy,
            strategies: self
                .collections
                .iter()
                .filter_map(|c| c.strategy.map(|s| (c.name.clone(), s)))
                .collect(),
            remote_only: self.sync.remote_only,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    /// Resolves the state directory: explicit override, then config, then
    /// the platform data directory.
    pub fn state_dir(&self, override_dir: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = override_dir {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        default_state_dir().ok_or_else(|| Error::Config("cannot determine a data directory; set state_dir".to_string()))
    }
}

/// Platform data directory for engine state.
pub fn default_state_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(STATE_DIR_NAME))
}

pub fn db_path(state_dir: &Path) -> PathBuf {
    state_dir.join(DB_FILE_NAME)
}

pub fn queue_path(state_dir: &Path) -> PathBuf {
    state_dir.join(QUEUE_FILE_NAME)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
