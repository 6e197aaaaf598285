// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::names;
use super::*;
use std::path::PathBuf;

#[test]
fn constants_match_env_var_names() {
    assert_eq!(names::TEND_CONFIG, "TEND_CONFIG");
    assert_eq!(names::TEND_STATE_DIR, "TEND_STATE_DIR");
    assert_eq!(names::RUST_LOG, "RUST_LOG");
}

#[test]
fn config_path_follows_env() {
    {
        let _guard = EnvGuard::set(names::TEND_CONFIG, "/etc/tend/config.toml");
        assert_eq!(config_path(), Some(PathBuf::from("/etc/tend/config.toml")));
    }
    {
        let _guard = EnvGuard::set(names::TEND_CONFIG, "");
        assert_eq!(config_path(), None);
    }
    let _guard = EnvGuard::remove(names::TEND_CONFIG);
    assert_eq!(config_path(), None);
}

#[test]
fn state_dir_follows_env() {
    {
        let _guard = EnvGuard::set(names::TEND_STATE_DIR, "/custom/state");
        assert_eq!(state_dir(), Some(PathBuf::from("/custom/state")));
    }
    let _guard = EnvGuard::remove(names::TEND_STATE_DIR);
    assert_eq!(state_dir(), None);
}

/// RAII guard that sets/removes an env var and restores it on drop.
struct EnvGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let original = std::env::var(key).ok();
        std::env::set_var(key, value);
        Self { key, original }
    }

    fn remove(key: &'static str) -> Self {
        let original = std::env::var(key).ok();
        std::env::remove_var(key);
        Self { key, original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.original {
            Some(value) => std::env::set_var(self.key, value),
            None => std::env::remove_var(self.key),
        }
    }
}
