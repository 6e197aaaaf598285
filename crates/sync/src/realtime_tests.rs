// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::test_helpers::{fields, MockChannel};
use serde_json::json;
use tend_core::OpKind;

fn event(collection: &str) -> ChangeEvent {
    ChangeEvent {
        collection: collection.into(),
        kind: OpKind::Update,
        record: fields(json!({"id": "t1", "user_id": "u1"})),
    }
}

#[tokio::test]
async fn feed_forwards_events_from_every_subscription() {
    let channel = Arc::new(MockChannel::new());
    let feed = RealtimeFeed::new(channel.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let live = feed
        .subscribe_all(
            vec![("tasks".into(), EventFilter::all()), ("notes".into(), EventFilter::owned_by("user_id", "u1"))],
            tx,
        )
        .await;
    assert_eq!(live, 2);
    assert_eq!(feed.subscribed(), vec!["tasks".to_string(), "notes".to_string()]);

    assert_eq!(channel.emit(event("tasks")), 1);
    assert_eq!(channel.emit(event("notes")), 1);
    assert_eq!(channel.emit(event("other")), 0);

    assert_eq!(rx.recv().await.unwrap().collection, "tasks");
    assert_eq!(rx.recv().await.unwrap().collection, "notes");
}

#[tokio::test]
async fn feed_degrades_when_channel_unavailable() {
    let channel = Arc::new(MockChannel::new());
    channel.set_unavailable(true);
    let feed = RealtimeFeed::new(channel.clone());
    let (tx, _rx) = mpsc::unbounded_channel();

    let live = feed.subscribe_all(vec![("tasks".into(), EventFilter::all())], tx).await;

    assert_eq!(live, 0);
    assert!(feed.subscribed().is_empty());
}

#[tokio::test]
async fn close_revokes_everything() {
    let channel = Arc::new(MockChannel::new());
    let feed = RealtimeFeed::new(channel.clone());
    let (tx, _rx) = mpsc::unbounded_channel();
    feed.subscribe_all(vec![("tasks".into(), EventFilter::all())], tx).await;
    assert_eq!(channel.active(), 1);

    feed.close().await;

    assert_eq!(channel.active(), 0);
    assert!(feed.subscribed().is_empty());
}

#[test]
fn realtime_error_display() {
    assert_eq!(RealtimeError::ConnectionClosed.to_string(), "connection closed");
    assert!(RealtimeError::ConnectionFailed("refused".into()).to_string().contains("refused"));
}
