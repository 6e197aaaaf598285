// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL (JSON Lines) file utilities.
//!
//! Provides durable append-only storage for JSON-serializable records.
//! Each record is stored as a single JSON line with fsync for durability.
//! Reads are lenient: a line that fails to parse is reported alongside the
//! good records instead of failing the whole file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// One non-empty line of a JSONL file.
#[derive(Debug, Clone, PartialEq)]
pub enum Line<T> {
    /// A line that parsed into a record.
    Record { number: usize, raw: String, record: T },
    /// A line that did not parse. `raw` is kept so rewrites can preserve it.
    Corrupt { number: usize, raw: String, reason: String },
}

impl<T> Line<T> {
    /// The original text of the line.
    pub fn raw(&self) -> &str {
        match self {
            Line::Record { raw, .. } | Line::Corrupt { raw, .. } => raw,
        }
    }

    /// 1-based line number in the file.
    pub fn number(&self) -> usize {
        match self {
            Line::Record { number, .. } | Line::Corrupt { number, .. } => *number,
        }
    }
}

/// Appends a record to a JSONL file with fsync for durability.
pub fn append<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let json = serde_json::to_string(record)?;
    writeln!(file, "{json}")?;
    file.sync_all()?;

    Ok(())
}

/// Reads every non-empty line from a JSONL file.
///
/// Returns an empty vec if the file doesn't exist.
pub fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<Line<T>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let raw = line?;
        if raw.trim().is_empty() {
            continue;
        }
        let number = idx + 1;
        match serde_json::from_str(&raw) {
            Ok(record) => lines.push(Line::Record { number, raw, record }),
            Err(e) => lines.push(Line::Corrupt { number, raw, reason: e.to_string() }),
        }
    }

    Ok(lines)
}

/// Replaces the file's content with `lines`, atomically.
///
/// Writes to a sibling temp file, fsyncs it, then renames it over `path`,
/// so readers see either the old or the new content.
pub fn rewrite<'a, I>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
