// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the offline queue module.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use crate::test_helpers::{entity, fields, MockRemote};
use serde_json::json;
use std::io::Write;
use tempfile::tempdir;
use tend_core::clock::from_millis;
use tend_core::{FieldMap, Fields};

fn schema(name: &str) -> CollectionSchema {
    CollectionSchema::new(name, "user_id")
}

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new("user_id");
    registry.register("tasks", FieldMap::new());
    registry.register("notes", FieldMap::new().rename("title", "heading"));
    registry
}

fn insert(queue: &OfflineQueue, collection: &str, id: &str, title: &str) -> QueuedOperation {
    queue.enqueue(collection, OpKind::Insert, OpPayload::snapshot(entity(id, title, 1_000))).unwrap()
}

#[test]
fn test_queue_empty_file() {
    let dir = tempdir().unwrap();
    let queue_path = dir.path().join("empty.jsonl");
    std::fs::write(&queue_path, "").unwrap();

    let queue = OfflineQueue::open(&queue_path).unwrap();
    assert!(queue.is_empty().unwrap());
    assert_eq!(queue.len().unwrap(), 0);
}

#[test]
fn test_queue_open_creates_parent_directories() {
    let dir = tempdir().unwrap();
    let queue_path = dir.path().join("state").join("queue.jsonl");

    let queue = OfflineQueue::open(&queue_path).unwrap();
    assert!(queue.path().exists());
}

#[test]
fn test_enqueue_assigns_fresh_ids_and_preserves_order() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();

    let a = insert(&queue, "tasks", "e1", "one");
    let b = insert(&queue, "tasks", "e2", "two");
    assert_ne!(a.id, b.id);

    let ops = queue.peek_all().unwrap();
    assert_eq!(ops, vec![a, b]);
}

#[test]
fn test_queue_survives_reopen() {
    let dir = tempdir().unwrap();
    let queue_path = dir.path().join("queue.jsonl");
    {
        let queue = OfflineQueue::open(&queue_path).unwrap();
        insert(&queue, "tasks", "e1", "one");
        insert(&queue, "notes", "n1", "note");
    }

    let queue = OfflineQueue::open(&queue_path).unwrap();
    assert_eq!(queue.len().unwrap(), 2);
    assert_eq!(queue.pending_count("tasks").unwrap(), 1);
    assert_eq!(queue.pending_count("notes").unwrap(), 1);
    assert_eq!(queue.pending_count("other").unwrap(), 0);
}

#[test]
fn test_queue_file_with_blank_lines() {
    let dir = tempdir().unwrap();
    let queue_path = dir.path().join("blanks.jsonl");
    let queue = OfflineQueue::open(&queue_path).unwrap();
    insert(&queue, "tasks", "e1", "one");

    let mut file = std::fs::OpenOptions::new().append(true).open(&queue_path).unwrap();
    writeln!(file).unwrap();
    writeln!(file, "   ").unwrap();

    insert(&queue, "tasks", "e2", "two");
    assert_eq!(queue.peek_all().unwrap().len(), 2);
}

#[test]
fn test_corrupt_lines_are_reported_and_skipped() {
    let dir = tempdir().unwrap();
    let queue_path = dir.path().join("queue.jsonl");
    let queue = OfflineQueue::open(&queue_path).unwrap();
    insert(&queue, "tasks", "e1", "one");

    let mut file = std::fs::OpenOptions::new().append(true).open(&queue_path).unwrap();
    writeln!(file, "{{\"truncated\":").unwrap();

    insert(&queue, "tasks", "e2", "two");

    let snapshot = queue.snapshot().unwrap();
    assert_eq!(snapshot.ops.len(), 2);
    assert_eq!(snapshot.corrupt.len(), 1);
    assert_eq!(snapshot.corrupt[0].line, 2);
}

#[test]
fn test_remove_keeps_other_ops_and_corrupt_lines() {
    let dir = tempdir().unwrap();
    let queue_path = dir.path().join("queue.jsonl");
    let queue = OfflineQueue::open(&queue_path).unwrap();
    let a = insert(&queue, "tasks", "e1", "one");
    std::fs::OpenOptions::new()
        .append(true)
        .open(&queue_path)
        .and_then(|mut f| writeln!(f, "garbage"))
        .unwrap();
    let b = insert(&queue, "tasks", "e2", "two");

    let removed = queue.remove(&HashSet::from([a.id])).unwrap();
    assert_eq!(removed, 1);

    let snapshot = queue.snapshot().unwrap();
    assert_eq!(snapshot.ops, vec![b]);
    assert_eq!(snapshot.corrupt.len(), 1);
    assert!(std::fs::read_to_string(&queue_path).unwrap().contains("garbage"));
}

#[test]
fn test_remove_nothing_is_a_noop() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    insert(&queue, "tasks", "e1", "one");

    assert_eq!(queue.remove(&HashSet::new()).unwrap(), 0);
    assert_eq!(queue.len().unwrap(), 1);
}

#[test]
fn test_clear() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    insert(&queue, "tasks", "e1", "one");
    insert(&queue, "tasks", "e2", "two");

    queue.clear().unwrap();
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn test_drain_applies_everything_when_online() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    let remote = MockRemote::new();
    insert(&queue, "tasks", "e1", "one");
    insert(&queue, "tasks", "e2", "two");
    insert(&queue, "notes", "n1", "note");

    let report = queue.drain(&remote, &registry()).await.unwrap();

    assert_eq!(report.applied, 3);
    assert_eq!(report.failed, 0);
    assert!(queue.is_empty().unwrap());
    assert_eq!(remote.records("tasks").len(), 2);
    let note = remote.record("notes", "n1").unwrap();
    assert_eq!(note.get("heading"), Some(&json!("note")));
}

#[tokio::test]
async fn test_drain_twice_does_not_duplicate_remote_records() {
    let dir = tempdir().unwrap();
    let queue_path = dir.path().join("queue.jsonl");
    let queue = OfflineQueue::open(&queue_path).unwrap();
    let remote = MockRemote::new();
    let op = insert(&queue, "tasks", "e1", "one");

    queue.drain_collection(&remote, &schema("tasks")).await.unwrap();
    // A crash before the rewrite leaves the op in the file.
    queue.push(&op).unwrap();
    let report = queue.drain_collection(&remote, &schema("tasks")).await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(remote.records("tasks").len(), 1);
}

#[tokio::test]
async fn test_drain_insert_then_update_reflects_update() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    let remote = MockRemote::new();
    let created = entity("e1", "draft", 1_000);
    let edited = created.patched(&fields(json!({"title": "final"}))).bump(chrono::Utc::now());
    queue.enqueue("tasks", OpKind::Insert, OpPayload::snapshot(created)).unwrap();
    queue.enqueue("tasks", OpKind::Update, OpPayload::snapshot(edited)).unwrap();

    let report = queue.drain_collection(&remote, &schema("tasks")).await.unwrap();

    assert_eq!(report.applied, 2);
    let record = remote.record("tasks", "e1").unwrap();
    assert_eq!(record.get("title"), Some(&json!("final")));
    assert_eq!(record.get("version"), Some(&json!(2)));
    assert_eq!(remote.calls(), vec!["insert tasks e1", "update tasks e1"]);
}

#[tokio::test]
async fn test_drain_patch_and_delete_payloads() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    let remote = MockRemote::new();
    insert(&queue, "tasks", "e1", "one");
    queue.enqueue("tasks", OpKind::Update, OpPayload::patch("e1", fields(json!({"done": true})))).unwrap();
    queue.enqueue("tasks", OpKind::Delete, OpPayload::patch("e1", Fields::new())).unwrap();

    let report = queue.drain_collection(&remote, &schema("tasks")).await.unwrap();

    assert_eq!(report.applied, 3);
    let record = remote.record("tasks", "e1").unwrap();
    assert_eq!(record.get("done"), Some(&json!(true)));
    assert_eq!(record.get("deleted"), Some(&json!(true)));
}

#[tokio::test]
async fn test_drain_never_moves_remote_version_backwards() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    let remote = MockRemote::new();
    let theirs = entity("e1", "theirs", 5_000).raised_to(5, from_millis(5_000));
    remote.seed("tasks", schema("tasks").to_wire(&theirs));
    let mine = entity("e1", "mine", 1_000).bump(from_millis(2_000));
    queue.enqueue("tasks", OpKind::Update, OpPayload::snapshot(mine.clone())).unwrap();
    queue.enqueue("tasks", OpKind::Update, OpPayload::patch("e1", fields(json!({"title": "later"})))).unwrap();
    insert(&queue, "tasks", "e2", "two");

    let report = queue.drain_collection(&remote, &schema("tasks")).await.unwrap();

    assert_eq!(report.superseded, 2);
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 0);
    assert!(queue.is_empty().unwrap());
    let record = remote.record("tasks", "e1").unwrap();
    assert_eq!(record.get("version"), Some(&json!(5)));
    assert_eq!(record.get("title"), Some(&json!("theirs")));
    assert_eq!(remote.calls(), vec!["insert tasks e2"]);
}

#[tokio::test]
async fn test_drain_snapshot_behind_remote_in_either_field_is_superseded() {
    // (remote version, remote updated_at); the snapshot is v2 at 2_000
    for (version, at_ms) in [(3, 1_000), (1, 9_000)] {
        let dir = tempdir().unwrap();
        let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
        let remote = MockRemote::new();
        let theirs = entity("e1", "theirs", at_ms).raised_to(version, from_millis(at_ms));
        remote.seed("tasks", schema("tasks").to_wire(&theirs));
        let mine = entity("e1", "mine", 1_000).bump(from_millis(2_000));
        queue.enqueue("tasks", OpKind::Update, OpPayload::snapshot(mine)).unwrap();

        let report = queue.drain_collection(&remote, &schema("tasks")).await.unwrap();

        assert_eq!(report.superseded, 1, "remote v{version} at {at_ms}");
        assert!(remote.calls().is_empty());
    }
}

#[tokio::test]
async fn test_drain_overwrites_older_remote_revision() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    let remote = MockRemote::new();
    remote.seed("tasks", schema("tasks").to_wire(&entity("e1", "old", 1_000)));
    let mine = entity("e1", "old", 1_000).patched(&fields(json!({"title": "new"}))).bump(from_millis(2_000));
    queue.enqueue("tasks", OpKind::Update, OpPayload::snapshot(mine)).unwrap();

    let report = queue.drain_collection(&remote, &schema("tasks")).await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.superseded, 0);
    let record = remote.record("tasks", "e1").unwrap();
    assert_eq!(record.get("version"), Some(&json!(2)));
    assert_eq!(record.get("title"), Some(&json!("new")));
}

#[tokio::test]
async fn test_drain_offline_keeps_everything_queued() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    let remote = MockRemote::new();
    remote.set_offline(true);
    insert(&queue, "tasks", "e1", "one");
    insert(&queue, "tasks", "e2", "two");
    insert(&queue, "tasks", "e3", "three");

    let report = queue.drain_collection(&remote, &schema("tasks")).await.unwrap();

    assert_eq!(report.applied, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.deferred, 2);
    assert!(report.hit_transport_failure());
    assert_eq!(queue.len().unwrap(), 3);
}

#[tokio::test]
async fn test_drain_application_failure_only_blocks_that_entity() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    let remote = MockRemote::new();
    remote.reject("e1");
    insert(&queue, "tasks", "e1", "one");
    queue.enqueue("tasks", OpKind::Update, OpPayload::snapshot(entity("e1", "edited", 2_000))).unwrap();
    insert(&queue, "tasks", "e2", "two");

    let report = queue.drain_collection(&remote, &schema("tasks")).await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.deferred, 1);
    assert!(!report.hit_transport_failure());
    assert_eq!(report.failures[0].op.entity_id(), "e1");
    assert!(matches!(report.failures[0].error, RemoteError::Application { status: 422, .. }));

    let remaining = queue.peek_all().unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|op| op.entity_id() == "e1"));
}

#[tokio::test]
async fn test_drain_collection_leaves_other_collections_alone() {
    let dir = tempdir().unwrap();
    let queue = OfflineQueue::open(&dir.path().join("queue.jsonl")).unwrap();
    let remote = MockRemote::new();
    insert(&queue, "tasks", "e1", "one");
    insert(&queue, "notes", "n1", "note");

    let report = queue.drain_collection(&remote, &schema("tasks")).await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(queue.pending_count("notes").unwrap(), 1);
    assert_eq!(queue.pending_count("tasks").unwrap(), 0);
}

#[tokio::test]
async fn test_drain_reports_corruption_but_continues() {
    let dir = tempdir().unwrap();
    let queue_path = dir.path().join("queue.jsonl");
    let queue = OfflineQueue::open(&queue_path).unwrap();
    let remote = MockRemote::new();
    std::fs::write(&queue_path, "not json at all\n").unwrap();
    insert(&queue, "tasks", "e1", "one");

    let report = queue.drain(&remote, &registry()).await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.corrupt, vec![QueueCorruption { line: 1, reason: report.corrupt[0].reason.clone() }]);
    assert_eq!(queue.snapshot().unwrap().corrupt.len(), 1);
}

#[test]
fn test_drain_report_absorb() {
    let mut total = DrainReport { applied: 1, ..DrainReport::default() };
    total.absorb(DrainReport {
        applied: 2,
        failed: 1,
        deferred: 3,
        superseded: 2,
        corrupt: vec![QueueCorruption { line: 4, reason: "eof".into() }],
        ..DrainReport::default()
    });
    assert_eq!((total.applied, total.failed, total.deferred, total.superseded), (3, 1, 3, 2));
    assert_eq!(total.corrupt.len(), 1);
}
