// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

fn record(value: Value) -> Fields {
    value.as_object().unwrap().clone()
}

fn notes_schema() -> CollectionSchema {
    CollectionSchema::new("notes", "user_id")
        .with_fields(FieldMap::new().rename("body", "content").rename("pinned", "is_pinned"))
}

fn note() -> Entity {
    Entity::new("n1", record(json!({"body": "hello", "pinned": true, "color": "red"})), from_millis(1_500))
        .with_owner("u1")
}

#[test]
fn field_map_defaults_to_identity() {
    let map = FieldMap::new();
    assert!(map.is_identity());
    assert_eq!(map.wire_name("title"), "title");
    assert_eq!(map.local_name("title"), "title");
}

#[test]
fn field_map_renames_both_ways() {
    let map: FieldMap = [("body", "content")].into_iter().collect();
    assert_eq!(map.wire_name("body"), "content");
    assert_eq!(map.local_name("content"), "body");
    assert_eq!(map.renames().collect::<Vec<_>>(), vec![("body", "content")]);
}

#[test]
fn to_wire_renames_payload_and_writes_metadata() {
    let wire = notes_schema().to_wire(&note());
    assert_eq!(wire.get("id"), Some(&json!("n1")));
    assert_eq!(wire.get("content"), Some(&json!("hello")));
    assert_eq!(wire.get("is_pinned"), Some(&json!(true)));
    assert_eq!(wire.get("color"), Some(&json!("red")));
    assert_eq!(wire.get("version"), Some(&json!(1)));
    assert_eq!(wire.get("deleted"), Some(&json!(false)));
    assert_eq!(wire.get("user_id"), Some(&json!("u1")));
    assert_eq!(wire.get("updated_at"), Some(&json!("1970-01-01T00:00:01.500Z")));
    assert!(wire.get("body").is_none());
}

#[test]
fn wire_mapping_preserves_entity() {
    let schema = notes_schema();
    let original = note().tombstone(from_millis(2_000));
    let parsed = schema.from_wire(&schema.to_wire(&original)).unwrap();
    assert_eq!(parsed, original);
}

#[test]
fn patch_to_wire_drops_metadata_keys() {
    let patch = record(json!({"body": "edited", "version": 99, "user_id": "someone"}));
    let wire = notes_schema().patch_to_wire(&patch);
    assert_eq!(wire, record(json!({"content": "edited"})));
}

#[test]
fn from_wire_defaults_missing_version_and_deleted() {
    let e = notes_schema()
        .from_wire(&record(json!({"id": "n2", "updated_at": "2026-03-01T10:00:00Z", "content": "x"})))
        .unwrap();
    assert_eq!(e.version, 1);
    assert!(!e.deleted);
    assert_eq!(e.owner, None);
    assert_eq!(e.get("body"), Some(&json!("x")));
}

#[test]
fn from_wire_accepts_numeric_ids_and_epoch_millis() {
    let e = notes_schema()
        .from_wire(&record(json!({"id": 7, "updated_at": 2_500, "version": 3})))
        .unwrap();
    assert_eq!(e.id, "7");
    assert_eq!(e.updated_at, from_millis(2_500));
    assert_eq!(e.version, 3);
}

#[parameterized(
    missing_id = { json!({"updated_at": "2026-03-01T10:00:00Z"}) },
    blank_id = { json!({"id": " ", "updated_at": "2026-03-01T10:00:00Z"}) },
    missing_timestamp = { json!({"id": "a"}) },
    bad_timestamp = { json!({"id": "a", "updated_at": "last tuesday"}) },
    negative_version = { json!({"id": "a", "updated_at": 1, "version": -1}) },
)]
fn from_wire_rejects_malformed_records(value: Value) {
    assert!(notes_schema().from_wire(&record(value)).is_err());
}

#[test]
fn registry_falls_back_to_identity_schema() {
    let mut registry = SchemaRegistry::new("owner_id");
    registry.register("notes", FieldMap::new().rename("body", "content"));

    assert!(registry.contains("notes"));
    assert_eq!(registry.get("notes").unwrap().fields.wire_name("body"), "content");

    let fallback = registry.get_or_identity("archived");
    assert_eq!(fallback.name, "archived");
    assert_eq!(fallback.owner_field, "owner_id");
    assert!(fallback.fields.is_identity());
}

#[test]
fn registry_names_are_sorted() {
    let mut registry = SchemaRegistry::default();
    registry.register("tasks", FieldMap::new());
    registry.register("notes", FieldMap::new());
    assert_eq!(registry.names(), vec!["notes".to_string(), "tasks".to_string()]);
    assert_eq!(registry.owner_field(), DEFAULT_OWNER_FIELD);
}
