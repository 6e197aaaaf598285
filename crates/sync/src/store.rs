// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote collection store abstraction.
//!
//! Provides a trait-based store layer that enables:
//! - A REST adapter for production (see [`crate::http`])
//! - In-memory stores for unit testing
//!
//! Records cross this boundary in wire form; schema mapping happens in the
//! engine. Every failure is classified as either a transport failure (the
//! remote could not be reached) or an application failure (the remote was
//! reached and rejected the request).

use std::future::Future;
use std::pin::Pin;

use tend_core::Fields;

/// Error type for remote store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// No connectivity, DNS failure or timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered and refused the request.
    #[error("remote rejected request ({status}): {message}")]
    Application { status: u16, message: String },
}

impl RemoteError {
    pub fn transport(message: impl Into<String>) -> Self {
        RemoteError::Transport(message.into())
    }

    pub fn application(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Application { status, message: message.into() }
    }

    /// Returns true if the remote could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

/// Result type for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// Equality filter applied by `select`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub equals: Vec<(String, String)>,
}

impl Filter {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches records whose `column` equals `value`.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter { equals: vec![(column.into(), value.into())] }
    }

    /// Returns true if `record` satisfies every condition.
    pub fn matches(&self, record: &Fields) -> bool {
        self.equals.iter().all(|(column, value)| match record.get(column) {
            Some(serde_json::Value::String(s)) => s == value,
            Some(other) => other.to_string() == *value,
            None => false,
        })
    }
}

/// Remote collection store.
///
/// Writes must be idempotent per record id: `insert` is an upsert, and
/// `delete` marks the record deleted rather than removing it.
pub trait RemoteStore: Send + Sync {
    /// Fetch every record of `collection` matching `filter`.
    fn select<'a>(&'a self, collection: &'a str, filter: &'a Filter) -> StoreFuture<'a, Vec<Fields>>;

    /// Insert or replace a record by id.
    fn insert<'a>(&'a self, collection: &'a str, record: Fields) -> StoreFuture<'a, ()>;

    /// Apply a partial update to one record.
    fn update<'a>(&'a self, collection: &'a str, id: &'a str, patch: Fields) -> StoreFuture<'a, ()>;

    /// Mark one record deleted.
    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, ()>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<S> {
    fn select<'a>(&'a self, collection: &'a str, filter: &'a Filter) -> StoreFuture<'a, Vec<Fields>> {
        (**self).select(collection, filter)
    }

    fn insert<'a>(&'a self, collection: &'a str, record: Fields) -> StoreFuture<'a, ()> {
        (**self).insert(collection, record)
    }

    fn update<'a>(&'a self, collection: &'a str, id: &'a str, patch: Fields) -> StoreFuture<'a, ()> {
        (**self).update(collection, id, patch)
    }

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, ()> {
        (**self).delete(collection, id)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
