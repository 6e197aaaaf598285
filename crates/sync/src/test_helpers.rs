// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tend_core::clock::from_millis;
use tend_core::{ChangeEvent, Entity, EventFilter, Fields, SubscriptionId};

use crate::connectivity::NetworkProbe;
use crate::realtime::{ChangeCallback, RealtimeChannel, RealtimeError, RealtimeFuture};
use crate::store::{Filter, RemoteError, RemoteResult, RemoteStore, StoreFuture};

/// Builds a field map from a JSON object literal.
pub fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap_or_default()
}

/// A fresh entity with a `title` field, stamped at `at_ms`.
pub fn entity(id: &str, title: &str, at_ms: i64) -> Entity {
    Entity::new(id, fields(json!({ "title": title })), from_millis(at_ms))
}

/// In-memory remote store with failure injection.
#[derive(Default)]
pub struct MockRemote {
    tables: Mutex<HashMap<String, BTreeMap<String, Fields>>>,
    offline: AtomicBool,
    rejected: Mutex<HashSet<String>>,
    select_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
    selects: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a transport error while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Writes to record `id` fail with an application error.
    pub fn reject(&self, id: &str) {
        self.rejected.lock().unwrap().insert(id.to_string());
    }

    /// `select` sleeps before answering.
    pub fn set_select_delay(&self, delay: Duration) {
        *self.select_delay.lock().unwrap() = Some(delay);
    }

    pub fn seed(&self, collection: &str, record: Fields) {
        let id = record.get("id").and_then(Value::as_str).unwrap().to_string();
        self.tables.lock().unwrap().entry(collection.to_string()).or_default().insert(id, record);
    }

    pub fn records(&self, collection: &str) -> Vec<Fields> {
        self.tables
            .lock()
            .unwrap()
            .get(collection)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record(&self, collection: &str, id: &str) -> Option<Fields> {
        self.tables.lock().unwrap().get(collection).and_then(|t| t.get(id).cloned())
    }

    /// Write calls as `"<verb> <collection> <id>"`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    fn check(&self, id: Option<&str>) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::transport("network unreachable"));
        }
        if let Some(id) = id {
            if self.rejected.lock().unwrap().contains(id) {
                return Err(RemoteError::application(422, format!("record {id} violates a constraint")));
            }
        }
        Ok(())
    }

    fn record_call(&self, verb: &str, collection: &str, id: &str) {
        self.calls.lock().unwrap().push(format!("{verb} {collection} {id}"));
    }
}

impl RemoteStore for MockRemote {
    fn select<'a>(&'a self, collection: &'a str, filter: &'a Filter) -> StoreFuture<'a, Vec<Fields>> {
        Box::pin(async move {
            self.selects.fetch_add(1, Ordering::SeqCst);
            let delay = *self.select_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.check(None)?;
            Ok(self.records(collection).into_iter().filter(|r| filter.matches(r)).collect())
        })
    }

    fn insert<'a>(&'a self, collection: &'a str, record: Fields) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let id = record.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            self.check(Some(&id))?;
            self.record_call("insert", collection, &id);
            self.tables.lock().unwrap().entry(collection.to_string()).or_default().insert(id, record);
            Ok(())
        })
    }

    fn update<'a>(&'a self, collection: &'a str, id: &'a str, patch: Fields) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check(Some(id))?;
            self.record_call("update", collection, id);
            let mut tables = self.tables.lock().unwrap();
            let existing = tables
                .get_mut(collection)
                .and_then(|t| t.get_mut(id))
                .ok_or_else(|| RemoteError::application(404, format!("no record {id}")))?;
            for (k, v) in patch {
                existing.insert(k, v);
            }
            Ok(())
        })
    }

    fn delete<'a>(&'a self, collection: &'a str, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check(Some(id))?;
            self.record_call("delete", collection, id);
            let mut tables = self.tables.lock().unwrap();
            let existing = tables
                .get_mut(collection)
                .and_then(|t| t.get_mut(id))
                .ok_or_else(|| RemoteError::application(404, format!("no record {id}")))?;
            existing.insert("deleted".into(), Value::Bool(true));
            Ok(())
        })
    }
}

impl NetworkProbe for MockRemote {
    fn probe(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.check(None) })
    }
}

/// Probe that returns a configurable outcome.
pub struct MockProbe {
    outcome: Mutex<RemoteResult<()>>,
    calls: AtomicUsize,
}

impl MockProbe {
    pub fn online() -> Self {
        MockProbe { outcome: Mutex::new(Ok(())), calls: AtomicUsize::new(0) }
    }

    pub fn failing(error: RemoteError) -> Self {
        MockProbe { outcome: Mutex::new(Err(error)), calls: AtomicUsize::new(0) }
    }

    pub fn set(&self, outcome: RemoteResult<()>) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NetworkProbe for MockProbe {
    fn probe(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.lock().unwrap().clone()
        })
    }
}

/// In-process realtime channel; tests push events with [`MockChannel::emit`].
#[derive(Default)]
pub struct MockChannel {
    subscriptions: Mutex<BTreeMap<SubscriptionId, (String, EventFilter, ChangeCallback)>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriptions fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn active(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    /// Delivers `event` to every matching subscription. Returns deliveries.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        let targets: Vec<ChangeCallback> = self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|(collection, filter, _)| *collection == event.collection && filter.matches(&event))
            .map(|(_, _, callback)| Arc::clone(callback))
            .collect();
        for callback in &targets {
            callback(event.clone());
        }
        targets.len()
    }
}

impl RealtimeChannel for MockChannel {
    fn subscribe<'a>(
        &'a self,
        collection: &'a str,
        filter: EventFilter,
        callback: ChangeCallback,
    ) -> RealtimeFuture<'a, SubscriptionId> {
        Box::pin(async move {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(RealtimeError::ConnectionFailed("channel unavailable".into()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.subscriptions.lock().unwrap().insert(id, (collection.to_string(), filter, callback));
            Ok(id)
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) -> RealtimeFuture<'_, ()> {
        Box::pin(async move {
            self.subscriptions.lock().unwrap().remove(&id);
            Ok(())
        })
    }

    fn unsubscribe_all(&self) -> RealtimeFuture<'_, ()> {
        Box::pin(async move {
            self.subscriptions.lock().unwrap().clear();
            Ok(())
        })
    }
}
