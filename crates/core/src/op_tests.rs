// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::clock::from_millis;
use serde_json::json;
use yare::parameterized;

fn entity(id: &str) -> Entity {
    Entity::new(id, Fields::new(), from_millis(1_000)).with_field("title", "t")
}

#[parameterized(
    insert = { "insert", OpKind::Insert },
    update = { "update", OpKind::Update },
    delete = { "delete", OpKind::Delete },
    uppercase = { "DELETE", OpKind::Delete },
)]
fn op_kind_parses(input: &str, expected: OpKind) {
    assert_eq!(input.parse::<OpKind>().unwrap(), expected);
}

#[test]
fn op_kind_rejects_unknown() {
    let err = "upsert".parse::<OpKind>().unwrap_err();
    assert!(matches!(err, Error::InvalidOpKind(_)));
}

#[parameterized(
    insert = { OpKind::Insert },
    update = { OpKind::Update },
    delete = { OpKind::Delete },
)]
fn op_kind_display_matches_serde(kind: OpKind) {
    let json = serde_json::to_string(&kind).unwrap();
    assert_eq!(json, format!("\"{kind}\""));
}

#[parameterized(
    snapshot = { OpPayload::snapshot(entity("e1")), "e1" },
    patch = { OpPayload::patch("e2", Fields::new()), "e2" },
)]
fn payload_entity_id(payload: OpPayload, expected: &str) {
    assert_eq!(payload.entity_id(), expected);
}

#[test]
fn op_ids_are_unique() {
    let a = OpId::new();
    let b = OpId::new();
    assert_ne!(a, b);
    assert_ne!(a.to_string(), b.to_string());
}

#[test]
fn queued_operation_serializes_with_tagged_payload() {
    let op = QueuedOperation::new("tasks", OpKind::Insert, OpPayload::snapshot(entity("e1")), from_millis(5));
    let value = serde_json::to_value(&op).unwrap();

    assert_eq!(value["collection"], json!("tasks"));
    assert_eq!(value["kind"], json!("insert"));
    assert_eq!(value["payload"]["type"], json!("snapshot"));
    assert_eq!(value["payload"]["entity"]["id"], json!("e1"));

    let parsed: QueuedOperation = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, op);
    assert_eq!(parsed.entity_id(), "e1");
}
