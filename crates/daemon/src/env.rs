// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variables read by the daemon.

use std::path::PathBuf;

pub mod names {
    /// Path of the engine config file.
    pub const TEND_CONFIG: &str = "TEND_CONFIG";

    /// Override for the state directory.
    pub const TEND_STATE_DIR: &str = "TEND_STATE_DIR";

    /// Log filter read by tracing-subscriber.
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Config file named by `TEND_CONFIG`, if set and non-empty.
pub fn config_path() -> Option<PathBuf> {
    non_empty(names::TEND_CONFIG)
}

/// State directory named by `TEND_STATE_DIR`, if set and non-empty.
pub fn state_dir() -> Option<PathBuf> {
    non_empty(names::TEND_STATE_DIR)
}

fn non_empty(key: &str) -> Option<PathBuf> {
    std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
