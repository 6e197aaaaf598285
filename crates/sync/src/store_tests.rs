// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

fn record(value: serde_json::Value) -> Fields {
    value.as_object().unwrap().clone()
}

#[parameterized(
    transport = { RemoteError::transport("connection refused"), true },
    application = { RemoteError::application(404, "relation does not exist"), false },
)]
fn remote_error_classification(err: RemoteError, transport: bool) {
    assert_eq!(err.is_transport(), transport);
}

#[test]
fn application_error_display_includes_status() {
    let msg = RemoteError::application(422, "check constraint").to_string();
    assert!(msg.contains("422"));
    assert!(msg.contains("check constraint"));
}

#[test]
fn filter_all_matches_anything() {
    assert!(Filter::all().matches(&record(json!({"id": "a"}))));
}

#[parameterized(
    matching = { json!({"id": "a", "user_id": "u1"}), true },
    other_owner = { json!({"id": "a", "user_id": "u2"}), false },
    missing_column = { json!({"id": "a"}), false },
    numeric_column = { json!({"id": "a", "user_id": 7}), false },
)]
fn filter_eq(value: serde_json::Value, expected: bool) {
    assert_eq!(Filter::eq("user_id", "u1").matches(&record(value)), expected);
}

#[test]
fn filter_eq_compares_numbers_by_text() {
    assert!(Filter::eq("user_id", "7").matches(&record(json!({"user_id": 7}))));
}
