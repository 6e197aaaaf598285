// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline queue for persisting mutations the remote has not confirmed.
//!
//! Uses JSONL format for durability - each operation is written as a single
//! line and fsynced immediately. Draining replays operations per collection
//! in enqueue order and removes the applied ones in a single atomic rewrite
//! once every outcome is known, so a crash mid-drain replays unresolved
//! operations again (at-least-once delivery).
//!
//! Lines that no longer parse are reported and skipped, never dropped: a
//! rewrite carries them over verbatim.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tend_core::jsonl::{self, Line};
use tend_core::{Clock, CollectionSchema, Entity, OpId, OpKind, OpPayload, QueuedOperation, SchemaRegistry, SystemClock};

use crate::store::{Filter, RemoteError, RemoteResult, RemoteStore};

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<tend_core::Error> for QueueError {
    fn from(err: tend_core::Error) -> Self {
        match err {
            tend_core::Error::Io(e) => QueueError::Io(e),
            tend_core::Error::Json(e) => QueueError::Serialization(e),
            other => QueueError::Storage(other.to_string()),
        }
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// A persisted line that could not be parsed as an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueCorruption {
    /// 1-based line number in the queue file.
    pub line: usize,
    pub reason: String,
}

/// Parsed queue content.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub ops: Vec<QueuedOperation>,
    pub corrupt: Vec<QueueCorruption>,
}

/// An operation the remote refused or could not receive.
#[derive(Debug, Clone)]
pub struct FailedOperation {
    pub op: QueuedOperation,
    pub error: RemoteError,
}

/// Outcome of one drain.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Operations confirmed by the remote and removed from the queue.
    pub applied: usize,
    /// Operations attempted and rejected; they stay queued.
    pub failed: usize,
    /// Operations not attempted because an earlier one blocked them.
    pub deferred: usize,
    /// Snapshots dropped because the remote already held a newer revision.
    /// The local copy keeps the edit and reconciliation resolves the pair.
    pub superseded: usize,
    pub failures: Vec<FailedOperation>,
    pub corrupt: Vec<QueueCorruption>,
}

impl DrainReport {
    /// Folds another report into this one.
    pub fn absorb(&mut self, other: DrainReport) {
        self.applied += other.applied;
        self.failed += other.failed;
        self.deferred += other.deferred;
        self.superseded += other.superseded;
        self.failures.extend(other.failures);
        for corruption in other.corrupt {
            if !self.corrupt.contains(&corruption) {
                self.corrupt.push(corruption);
            }
        }
    }

    /// Returns true if any failure was a transport failure.
    pub fn hit_transport_failure(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_transport())
    }
}

/// Offline queue for persisting operations.
///
/// Operations are stored in a JSONL file, one operation per line. Methods
/// take `&self`; file access is serialized internally so an enqueue can
/// land while a drain is waiting on the remote.
pub struct OfflineQueue {
    /// Path to the queue file.
    path: PathBuf,
    clock: Arc<dyn Clock>,
    file_lock: Mutex<()>,
}

impl OfflineQueue {
    /// Create or open an offline queue at the given path.
    pub fn open(path: &Path) -> QueueResult<Self> {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    /// Create or open a queue that stamps operations with `clock`.
    pub fn with_clock(path: &Path, clock: Arc<dyn Clock>) -> QueueResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Ensure the file exists (create if not)
        OpenOptions::new().create(true).append(true).open(path)?;

        Ok(OfflineQueue { path: path.to_path_buf(), clock, file_lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enqueue a mutation with a fresh operation id.
    ///
    /// The operation is immediately persisted to disk.
    pub fn enqueue(&self, collection: &str, kind: OpKind, payload: OpPayload) -> QueueResult<QueuedOperation> {
        let op = QueuedOperation::new(collection, kind, payload, self.clock.now());
        self.push(&op)?;
        Ok(op)
    }

    /// Persist an already-built operation.
    pub fn push(&self, op: &QueuedOperation) -> QueueResult<()> {
        let _guard = self.lock();
        jsonl::append(&self.path, op)?;
        tracing::debug!(op = %op.id, collection = %op.collection, kind = %op.kind, "queued operation");
        Ok(())
    }

    /// Read every queued operation and every corrupt line.
    pub fn snapshot(&self) -> QueueResult<QueueSnapshot> {
        let lines = {
            let _guard = self.lock();
            jsonl::read_lines::<QueuedOperation>(&self.path)?
        };

        let mut snapshot = QueueSnapshot::default();
        for line in lines {
            match line {
                Line::Record { record, .. } => snapshot.ops.push(record),
                Line::Corrupt { number, reason, .. } => {
                    tracing::warn!(path = %self.path.display(), line = number, %reason, "skipping corrupt queue entry");
                    snapshot.corrupt.push(QueueCorruption { line: number, reason });
                }
            }
        }
        Ok(snapshot)
    }

    /// Read all queued operations without removing them.
    pub fn peek_all(&self) -> QueueResult<Vec<QueuedOperation>> {
        Ok(self.snapshot()?.ops)
    }

    /// Queued operations for one collection, oldest first.
    pub fn pending(&self, collection: &str) -> QueueResult<Vec<QueuedOperation>> {
        Ok(self.peek_all()?.into_iter().filter(|op| op.collection == collection).collect())
    }

    /// Size of one collection's slice of the queue.
    pub fn pending_count(&self, collection: &str) -> QueueResult<usize> {
        Ok(self.pending(collection)?.len())
    }

    /// Get the number of queued operations.
    pub fn len(&self) -> QueueResult<usize> {
        Ok(self.peek_all()?.len())
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove the given operations, keeping everything else in order.
    ///
    /// Re-reads the file under the lock so operations enqueued since the
    /// caller's snapshot survive. Returns the number removed.
    pub fn remove(&self, ids: &HashSet<OpId>) -> QueueResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock();
        let lines = jsonl::read_lines::<QueuedOperation>(&self.path)?;
        let before = lines.len();
        let kept: Vec<&Line<QueuedOperation>> = lines
            .iter()
            .filter(|line| !matches!(line, Line::Record { record, .. } if ids.contains(&record.id)))
            .collect();
        let removed = before - kept.len();

        jsonl::rewrite(&self.path, kept.into_iter().map(Line::raw))?;
        Ok(removed)
    }

    /// Clear all queued operations.
    pub fn clear(&self) -> QueueResult<()> {
        let _guard = self.lock();
        jsonl::rewrite(&self.path, std::iter::empty())?;
        Ok(())
    }

    /// Replay every queued operation, grouped by collection.
    pub async fn drain<R: RemoteStore + ?Sized>(&self, remote: &R, schemas: &SchemaRegistry) -> QueueResult<DrainReport> {
        let snapshot = self.snapshot()?;
        let mut collections: Vec<String> = Vec::new();
        for op in &snapshot.ops {
            if !collections.contains(&op.collection) {
                collections.push(op.collection.clone());
            }
        }

        let mut report = DrainReport { corrupt: snapshot.corrupt, ..DrainReport::default() };
        let mut applied = HashSet::new();
        for collection in &collections {
            let schema = schemas.get_or_identity(collection);
            let slice: Vec<&QueuedOperation> = snapshot.ops.iter().filter(|op| &op.collection == collection).collect();
            let (ids, partial) = replay_slice(remote, &schema, slice).await;
            applied.extend(ids);
            report.absorb(partial);
        }

        self.remove(&applied)?;
        Ok(report)
    }

    /// Replay one collection's slice of the queue.
    pub async fn drain_collection<R: RemoteStore + ?Sized>(
        &self,
        remote: &R,
        schema: &CollectionSchema,
    ) -> QueueResult<DrainReport> {
        let snapshot = self.snapshot()?;
        let slice: Vec<&QueuedOperation> = snapshot.ops.iter().filter(|op| op.collection == schema.name).collect();

        let (applied, mut report) = replay_slice(remote, schema, slice).await;
        report.corrupt = snapshot.corrupt;
        self.remove(&applied)?;
        Ok(report)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.file_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Replays one collection's operations in order.
///
/// Once an operation on an entity fails, later operations on that entity
/// are deferred. A transport failure defers the rest of the slice. Once a
/// snapshot is superseded by the remote, later operations on that entity
/// are superseded too.
async fn replay_slice<R: RemoteStore + ?Sized>(
    remote: &R,
    schema: &CollectionSchema,
    slice: Vec<&QueuedOperation>,
) -> (HashSet<OpId>, DrainReport) {
    let mut applied = HashSet::new();
    let mut report = DrainReport::default();
    let mut blocked: HashSet<&str> = HashSet::new();
    let mut stale: HashSet<&str> = HashSet::new();
    let mut unreachable = false;

    for op in slice {
        if unreachable || blocked.contains(op.entity_id()) {
            report.deferred += 1;
            continue;
        }
        if stale.contains(op.entity_id()) {
            applied.insert(op.id);
            report.superseded += 1;
            continue;
        }

        match replay(remote, schema, op).await {
            Ok(Replayed::Applied) => {
                applied.insert(op.id);
                report.applied += 1;
            }
            Ok(Replayed::Superseded(current)) => {
                tracing::info!(
                    op = %op.id,
                    collection = %op.collection,
                    entity = op.entity_id(),
                    remote_version = current.version,
                    "remote holds a newer revision, leaving the edit to reconciliation"
                );
                applied.insert(op.id);
                stale.insert(op.entity_id());
                report.superseded += 1;
            }
            Err(error) => {
                tracing::warn!(
                    op = %op.id,
                    collection = %op.collection,
                    entity = op.entity_id(),
                    %error,
                    "queued operation failed, keeping it queued"
                );
                unreachable = error.is_transport();
                blocked.insert(op.entity_id());
                report.failed += 1;
                report.failures.push(FailedOperation { op: op.clone(), error });
            }
        }
    }

    if report.applied + report.failed + report.deferred + report.superseded > 0 {
        tracing::info!(
            collection = %schema.name,
            applied = report.applied,
            failed = report.failed,
            deferred = report.deferred,
            superseded = report.superseded,
            "drained offline queue"
        );
    }
    (applied, report)
}

/// What happened to one replayed operation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Replayed {
    Applied,
    /// The remote copy is newer than the snapshot; nothing was written.
    Superseded(Entity),
}

/// Sends one operation to the remote store.
///
/// Snapshots are written only when the remote copy is absent or not newer
/// in either `version` or `updated_at`, so a replay never moves the remote
/// revision backwards. Inserts are upserts and a snapshot replayed twice
/// finds its own revision, so replaying an operation twice leaves the
/// remote unchanged.
pub(crate) async fn replay<R: RemoteStore + ?Sized>(
    remote: &R,
    schema: &CollectionSchema,
    op: &QueuedOperation,
) -> RemoteResult<Replayed> {
    let collection = op.collection.as_str();
    if let OpPayload::Snapshot { entity } = &op.payload {
        if let Some(current) = fetch(remote, schema, collection, &entity.id).await? {
            if current.version > entity.version || current.updated_at > entity.updated_at {
                return Ok(Replayed::Superseded(current));
            }
        }
    }

    match (op.kind, &op.payload) {
        (OpKind::Insert, OpPayload::Snapshot { entity }) => remote.insert(collection, schema.to_wire(entity)).await?,
        (OpKind::Insert, OpPayload::Patch { id, fields }) => {
            let mut record = schema.patch_to_wire(fields);
            record.insert("id".into(), serde_json::Value::String(id.clone()));
            remote.insert(collection, record).await?
        }
        (OpKind::Update | OpKind::Delete, OpPayload::Snapshot { entity }) => {
            remote.update(collection, &entity.id, schema.to_wire(entity)).await?
        }
        (OpKind::Update, OpPayload::Patch { id, fields }) => {
            remote.update(collection, id, schema.patch_to_wire(fields)).await?
        }
        (OpKind::Delete, OpPayload::Patch { id, .. }) => remote.delete(collection, id).await?,
    }
    Ok(Replayed::Applied)
}

/// Current remote revision of one record, if it exists and parses.
async fn fetch<R: RemoteStore + ?Sized>(
    remote: &R,
    schema: &CollectionSchema,
    collection: &str,
    id: &str,
) -> RemoteResult<Option<Entity>> {
    let records = remote.select(collection, &Filter::eq("id", id)).await?;
    Ok(records
        .iter()
        .filter_map(|record| schema.from_wire(record).ok())
        .find(|entity| entity.id == id))
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
