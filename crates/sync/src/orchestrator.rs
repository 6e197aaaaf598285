// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync orchestration.
//!
//! [`SyncOrchestrator`] owns the per-collection [`SyncState`] and is the
//! only component that mutates it. A run for one collection goes
//!
//! ```text
//! idle -> checking -> syncing -> idle
//!            |           |
//!            +-> offline +-> (errors recorded in the report)
//! ```
//!
//! and drains the offline queue before reconciling. At most one run per
//! collection is active at a time: the `in_flight` flag is claimed without
//! waiting, so a second trigger returns [`SyncOutcome::Skipped`] at once.
//! The flag is released by a drop guard on every exit path of a run.
//!
//! Runs are triggered by [`SyncOrchestrator::sync_now`], by the periodic
//! timer and the reconnect watcher started with
//! [`SyncOrchestrator::start_session`], and by collection activation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tend_core::{
    ChangeEvent, Clock, CollectionSchema, Entity, EventFilter, OpKind, OpPayload, QueuedOperation, SchemaRegistry,
    Strategy, Winner,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::connectivity::{ConnectionStatus, ConnectivityMonitor};
use crate::error::{Error, Result};
use crate::local::LocalStore;
use crate::queue::{self, DrainReport, OfflineQueue, Replayed};
use crate::realtime::{RealtimeChannel, RealtimeFeed};
use crate::reconcile::{self, ReconcileReport, Reconciler, RemoteOnlyPolicy};
use crate::session::SessionProvider;
use crate::store::{Filter, RemoteStore};

/// Capacity of the state-change broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Per-collection sync state as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub connection_status: ConnectionStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub pending_count: usize,
    pub in_flight: bool,
}

impl SyncState {
    fn new(connection_status: ConnectionStatus) -> Self {
        SyncState { connection_status, last_synced_at: None, pending_count: 0, in_flight: false }
    }
}

/// Emitted whenever a collection's [`SyncState`] changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub collection: String,
    pub state: SyncState,
}

/// Tunables for scheduling and resolution.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Period of the background sync timer.
    pub sync_interval: Duration,
    /// Period of the background connectivity check.
    pub connectivity_interval: Duration,
    /// Strategy for collections without an override.
    pub strategy: Strategy,
    /// Per-collection strategy overrides.
    pub strategies: HashMap<String, Strategy>,
    pub remote_only: RemoteOnlyPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            sync_interval: Duration::from_secs(300),
            connectivity_interval: Duration::from_secs(60),
            strategy: Strategy::default(),
            strategies: HashMap::new(),
            remote_only: RemoteOnlyPolicy::default(),
        }
    }
}

impl SyncSettings {
    pub fn strategy_for(&self, collection: &str) -> Strategy {
        self.strategies.get(collection).copied().unwrap_or(self.strategy)
    }
}

/// Collaborators an orchestrator is assembled from.
pub struct SyncParts<R> {
    pub remote: Arc<R>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub local: LocalStore,
    pub queue: OfflineQueue,
    pub session: Arc<dyn SessionProvider>,
    pub schemas: SchemaRegistry,
    pub realtime: Option<Arc<dyn RealtimeChannel>>,
    pub clock: Arc<dyn Clock>,
}

/// Result of an optimistic write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Confirmed by the remote store.
    Sent(Entity),
    /// Stored locally and queued for the next drain.
    Queued(Entity),
    /// The remote already held a newer revision. The stored entity is the
    /// resolution of the pair; a write it still needs is queued.
    Resolved(Entity),
}

impl WriteOutcome {
    pub fn entity(&self) -> &Entity {
        match self {
            WriteOutcome::Sent(e) | WriteOutcome::Queued(e) | WriteOutcome::Resolved(e) => e,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, WriteOutcome::Queued(_))
    }
}

/// Why a run did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run for the collection is active.
    InFlight,
    /// The remote store is unreachable.
    Offline,
}

/// Everything one completed run did.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub collection: String,
    /// The run adopted remote data as the first sync of this collection.
    pub bootstrap: bool,
    pub drain: DrainReport,
    pub reconcile: ReconcileReport,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
    /// The run started but could not finish; the error was logged.
    Failed { error: String },
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped(_))
    }
}

/// Result of feeding one realtime event through the merge path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Local state now reflects the resolution.
    Applied(Winner),
    /// The event carried nothing new.
    Unchanged,
    /// A run was active for the collection; the event was dropped.
    Skipped,
}

struct Scheduler {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

struct Inner<R> {
    remote: Arc<R>,
    monitor: Arc<ConnectivityMonitor>,
    local: LocalStore,
    queue: OfflineQueue,
    session: Arc<dyn SessionProvider>,
    schemas: SchemaRegistry,
    settings: SyncSettings,
    clock: Arc<dyn Clock>,
    states: Mutex<HashMap<String, SyncState>>,
    events: broadcast::Sender<SyncEvent>,
    realtime: Option<RealtimeFeed>,
    scheduler: tokio::sync::Mutex<Option<Scheduler>>,
}

/// Schedules and runs sync for every configured collection.
///
/// Cheap to clone; clones share state.
pub struct SyncOrchestrator<R: RemoteStore + 'static> {
    inner: Arc<Inner<R>>,
}

impl<R: RemoteStore + 'static> Clone for SyncOrchestrator<R> {
    fn clone(&self) -> Self {
        SyncOrchestrator { inner: Arc::clone(&self.inner) }
    }
}

/// Clears `in_flight` for a collection when dropped.
struct InFlightGuard<'a, R: RemoteStore + 'static> {
    orchestrator: &'a SyncOrchestrator<R>,
    collection: &'a str,
}

impl<R: RemoteStore + 'static> Drop for InFlightGuard<'_, R> {
    fn drop(&mut self) {
        let status = self.orchestrator.inner.monitor.status();
        self.orchestrator.update_state(self.collection, |state| {
            state.in_flight = false;
            state.connection_status = status;
        });
    }
}

impl<R: RemoteStore + 'static> SyncOrchestrator<R> {
    pub fn new(parts: SyncParts<R>, settings: SyncSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Inner {
            remote: parts.remote,
            monitor: parts.monitor,
            local: parts.local,
            queue: parts.queue,
            session: parts.session,
            schemas: parts.schemas,
            settings,
            clock: parts.clock,
            states: Mutex::new(HashMap::new()),
            events,
            realtime: parts.realtime.map(RealtimeFeed::new),
            scheduler: tokio::sync::Mutex::new(None),
        };
        SyncOrchestrator { inner: Arc::new(inner) }
    }

    pub fn local(&self) -> &LocalStore {
        &self.inner.local
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.inner.queue
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.inner.monitor
    }

    /// Receiver of state-change events, for status indicators.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Current state of `collection`.
    ///
    /// Outside a run the connection status is the monitor's.
    pub fn get_sync_state(&self, collection: &str) -> SyncState {
        let status = self.inner.monitor.status();
        let states = self.inner.states.lock().unwrap_or_else(|e| e.into_inner());
        match states.get(collection) {
            Some(state) if state.in_flight => state.clone(),
            Some(state) => SyncState { connection_status: status, ..state.clone() },
            None => SyncState::new(status),
        }
    }

    /// Applies a local mutation, then sends it or queues it.
    ///
    /// The local store is written before any network attempt. The write is
    /// sent directly only when the remote is online, no run is active and
    /// nothing is queued for the collection, so queued operations keep
    /// their order.
    pub async fn enqueue_or_send(&self, collection: &str, kind: OpKind, payload: OpPayload) -> Result<WriteOutcome> {
        let schema = self.schema(collection)?;
        let user = self.inner.session.current_user_id().ok_or(Error::NoSession)?;
        let id = payload.entity_id().trim();
        if id.is_empty() {
            return Err(Error::InvalidEntity(format!("{collection} write without an id")));
        }

        let now = self.inner.clock.now();
        let existing = self.inner.local.get(collection, id)?;
        let not_found = || Error::EntityNotFound { collection: collection.to_string(), id: id.to_string() };
        let fields = match &payload {
            OpPayload::Snapshot { entity } => &entity.fields,
            OpPayload::Patch { fields, .. } => fields,
        };

        let mut entity = match (kind, existing) {
            (OpKind::Insert, None) => Entity::new(id, fields.clone(), now),
            (OpKind::Insert, Some(existing)) => {
                let mut revived = existing.patched(fields);
                revived.deleted = false;
                revived.bump(now)
            }
            (OpKind::Update, Some(existing)) => existing.patched(fields).bump(now),
            (OpKind::Update | OpKind::Delete, None) => return Err(not_found()),
            (OpKind::Delete, Some(existing)) => existing.tombstone(now),
        };
        entity.owner = Some(user);

        self.inner.local.put(collection, &entity)?;
        let op = QueuedOperation::new(collection, kind, OpPayload::snapshot(entity.clone()), now);

        let pending = self.inner.queue.pending_count(collection)?;
        // Held across the send so no run drains or selects this collection meanwhile.
        let hold = if self.inner.monitor.is_online() && pending == 0 { self.try_hold(collection) } else { None };
        if let Some(_hold) = hold {
            match queue::replay(&*self.inner.remote, &schema, &op).await {
                Ok(Replayed::Applied) => {
                    tracing::debug!(%collection, entity = %entity.id, %kind, "sent write");
                    return Ok(WriteOutcome::Sent(entity));
                }
                Ok(Replayed::Superseded(current)) => {
                    tracing::debug!(%collection, entity = %entity.id, %kind, "remote is newer, resolving write");
                    let (stored, _) = self.settle(collection, &entity, &current)?;
                    return Ok(WriteOutcome::Resolved(stored));
                }
                Err(e) => {
                    tracing::warn!(%collection, entity = %entity.id, error = %e, "write failed, queueing");
                    if e.is_transport() {
                        self.inner.monitor.mark_offline();
                    }
                }
            }
        }

        self.inner.queue.push(&op)?;
        self.update_state(collection, |state| state.pending_count = pending + 1);
        tracing::debug!(%collection, entity = %entity.id, %kind, "queued write");
        Ok(WriteOutcome::Queued(entity))
    }

    /// Runs one sync cycle for `collection` on behalf of `user_id`.
    ///
    /// Returns [`SyncOutcome::Skipped`] without waiting if a run is already
    /// active or the remote is unreachable.
    pub async fn sync_now(&self, collection: &str, user_id: &str) -> Result<SyncOutcome> {
        self.run_guarded(collection, user_id, false).await
    }

    /// Syncs a collection when it becomes active for the signed-in user.
    ///
    /// Behaves like [`SyncOrchestrator::sync_now`] but treats the run as a
    /// first sync: remote records are adopted over local ones.
    pub async fn activate(&self, collection: &str) -> Result<SyncOutcome> {
        let user = self.inner.session.current_user_id().ok_or(Error::NoSession)?;
        self.run_guarded(collection, &user, true).await
    }

    /// Syncs every configured collection concurrently.
    pub async fn sync_all(&self, user_id: &str) -> Vec<(String, Result<SyncOutcome>)> {
        let names = self.inner.schemas.names();
        let runs = names.iter().map(|name| self.sync_now(name, user_id));
        let outcomes = join_all(runs).await;
        names.into_iter().zip(outcomes).collect()
    }

    /// Feeds a pushed remote change through the per-entity merge path.
    pub async fn ingest(&self, event: ChangeEvent) -> Result<IngestOutcome> {
        let collection = event.collection.as_str();
        let schema = self.schema(collection)?;
        let Some(_hold) = self.try_hold(collection) else {
            tracing::debug!(%collection, "run in flight, dropping realtime event");
            return Ok(IngestOutcome::Skipped);
        };

        let mut remote = schema.from_wire(&event.record)?;
        if event.kind == OpKind::Delete {
            remote.deleted = true;
        }

        let Some(current) = self.inner.local.get(collection, &remote.id)? else {
            self.inner.local.put(collection, &remote)?;
            return Ok(IngestOutcome::Applied(Winner::Remote));
        };

        Ok(match self.settle(collection, &current, &remote)? {
            (_, Some(winner)) => IngestOutcome::Applied(winner),
            (_, None) => IngestOutcome::Unchanged,
        })
    }

    /// Resolves a local entity against the remote copy and stores the result.
    ///
    /// Returns the stored entity and, when the payloads differed, the winner.
    /// A resolution that must reach the remote is queued unless an operation
    /// for the entity is already pending.
    fn settle(&self, collection: &str, local: &Entity, remote: &Entity) -> Result<(Entity, Option<Winner>)> {
        let store = &self.inner.local;
        let reconciler = self.reconciler(collection, false);
        let Some((resolution, record)) = reconciler.resolve_pair(collection, local, remote) else {
            let raised = local.clone().raised_to(remote.version, remote.updated_at);
            store.put(collection, &raised)?;
            return Ok((raised, None));
        };

        store.put(collection, &resolution.entity)?;
        store.record_conflict(&record)?;
        if resolution.needs_remote_write() {
            let queued = self.inner.queue.pending(collection)?.iter().any(|op| op.entity_id() == remote.id);
            if !queued {
                let op = self.inner.queue.enqueue(collection, OpKind::Update, OpPayload::snapshot(resolution.entity.clone()))?;
                tracing::debug!(%collection, entity = %op.entity_id(), winner = ?resolution.winner, "queued conflict resolution");
                self.update_state(collection, |state| state.pending_count += 1);
            }
        }
        Ok((resolution.entity, Some(resolution.winner)))
    }

    /// Starts the background scheduler for the signed-in user.
    ///
    /// Spawns the connectivity monitor, the periodic sync timer, the
    /// reconnect watcher and, when a realtime channel is configured, the
    /// realtime ingestion task. A running scheduler is stopped first.
    pub async fn start_session(&self, presence: Option<mpsc::Receiver<bool>>) -> Result<()> {
        let user = self.inner.session.current_user_id().ok_or(Error::NoSession)?;
        self.end_session().await;

        let cancel = CancellationToken::new();
        let settings = &self.inner.settings;
        let mut handles = vec![
            Arc::clone(&self.inner.monitor).spawn(settings.connectivity_interval, presence, cancel.child_token()),
            self.spawn_timer(settings.sync_interval, cancel.child_token()),
            self.spawn_reconnect_watcher(cancel.child_token()),
        ];

        if let Some(feed) = &self.inner.realtime {
            let (tx, rx) = mpsc::unbounded_channel();
            let owner_field = self.inner.schemas.owner_field().to_string();
            let targets = self
                .inner
                .schemas
                .names()
                .into_iter()
                .map(|name| (name, EventFilter::owned_by(owner_field.clone(), user.clone())))
                .collect();
            if feed.subscribe_all(targets, tx).await > 0 {
                handles.push(self.spawn_ingest(rx, cancel.child_token()));
            }
        }

        tracing::info!(user = %user, collections = self.inner.schemas.names().len(), "sync session started");
        *self.inner.scheduler.lock().await = Some(Scheduler { cancel, handles });
        Ok(())
    }

    /// Stops the scheduler and revokes realtime subscriptions.
    ///
    /// Per-collection state is cleared so nothing carries over to the next
    /// session.
    pub async fn end_session(&self) {
        let Some(scheduler) = self.inner.scheduler.lock().await.take() else {
            return;
        };
        scheduler.cancel.cancel();
        for result in join_all(scheduler.handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        if let Some(feed) = &self.inner.realtime {
            feed.close().await;
        }
        self.inner.states.lock().unwrap_or_else(|e| e.into_inner()).clear();
        tracing::info!("sync session ended");
    }

    /// Returns true while the background scheduler runs.
    pub async fn session_active(&self) -> bool {
        self.inner.scheduler.lock().await.is_some()
    }

    async fn run_guarded(&self, collection: &str, user_id: &str, bootstrap: bool) -> Result<SyncOutcome> {
        let schema = self.schema(collection)?;
        let Some(_guard) = self.try_begin(collection) else {
            tracing::debug!(%collection, "sync already in flight, skipping");
            return Ok(SyncOutcome::Skipped(SkipReason::InFlight));
        };

        if !self.inner.monitor.check_now().await.is_online() {
            let pending = self.inner.queue.pending_count(collection)?;
            self.update_state(collection, |state| state.pending_count = pending);
            tracing::debug!(%collection, pending, "remote unreachable, skipping sync");
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }

        self.update_state(collection, |state| state.connection_status = ConnectionStatus::Syncing);
        match self.run(&schema, user_id, bootstrap).await {
            Ok(report) => Ok(SyncOutcome::Completed(report)),
            Err(e) => {
                tracing::error!(%collection, error = %e, "sync run failed");
                Ok(SyncOutcome::Failed { error: e.to_string() })
            }
        }
    }

    async fn run(&self, schema: &CollectionSchema, user_id: &str, force_bootstrap: bool) -> Result<SyncReport> {
        let inner = &self.inner;
        let collection = schema.name.as_str();

        let drain = inner.queue.drain_collection(&*inner.remote, schema).await?;
        if drain.hit_transport_failure() {
            inner.monitor.mark_offline();
        }

        let previous = inner.local.last_synced_at(collection, user_id)?;
        let local = inner.local.list(collection, Some(user_id))?;
        let filter = Filter::eq(schema.owner_field.clone(), user_id);

        let (outcome, bootstrap) = match inner.remote.select(collection, &filter).await {
            Err(e) => {
                if e.is_transport() {
                    inner.monitor.mark_offline();
                }
                (reconcile::unreachable(collection, local, e), false)
            }
            Ok(records) => {
                let (entities, rejected) = reconcile::decode(schema, records);
                let bootstrap = (force_bootstrap || previous.is_none()) && !entities.is_empty();
                let reconciler = self.reconciler(collection, bootstrap);
                let plan = reconciler.plan(collection, &local, &entities);
                let mut outcome = reconciler.execute(plan, &*inner.remote, schema).await;
                outcome.report.errors.extend(rejected);
                if !outcome.report.remote_reachable {
                    inner.monitor.mark_offline();
                }
                (outcome, bootstrap)
            }
        };

        inner.local.put_all(collection, &outcome.snapshot)?;
        for record in &outcome.report.resolutions {
            inner.local.record_conflict(record)?;
        }

        let mut last_synced_at = previous;
        if outcome.report.remote_reachable && outcome.report.select_error.is_none() {
            let now = inner.clock.now();
            inner.local.set_last_synced_at(collection, user_id, now)?;
            last_synced_at = Some(now);
        }

        let pending = inner.queue.pending_count(collection)?;
        self.update_state(collection, |state| {
            state.pending_count = pending;
            state.last_synced_at = last_synced_at;
        });

        tracing::info!(
            %collection,
            bootstrap,
            applied = drain.applied,
            failed = drain.failed,
            pending,
            errors = outcome.report.errors.len(),
            "sync run finished"
        );
        Ok(SyncReport {
            collection: collection.to_string(),
            bootstrap,
            drain,
            reconcile: outcome.report,
            last_synced_at,
        })
    }

    fn spawn_timer(&self, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => this.sync_signed_in("timer").await,
                }
            }
        })
    }

    fn spawn_reconnect_watcher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        let mut status = self.inner.monitor.subscribe();
        tokio::spawn(async move {
            let mut settled = *status.borrow_and_update();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = status.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let current = *status.borrow_and_update();
                        match current {
                            ConnectionStatus::Online if settled == ConnectionStatus::Offline => {
                                settled = current;
                                tracing::info!("reconnected, syncing all collections");
                                this.sync_signed_in("reconnect").await;
                            }
                            ConnectionStatus::Online | ConnectionStatus::Offline => settled = current,
                            ConnectionStatus::Checking | ConnectionStatus::Syncing => {}
                        }
                    }
                }
            }
        })
    }

    fn spawn_ingest(&self, mut events: mpsc::UnboundedReceiver<ChangeEvent>, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = events.recv() => {
                        let Some(event) = event else { return };
                        let collection = event.collection.clone();
                        if let Err(e) = this.ingest(event).await {
                            tracing::warn!(%collection, error = %e, "failed to ingest realtime event");
                        }
                    }
                }
            }
        })
    }

    async fn sync_signed_in(&self, trigger: &str) {
        let Some(user) = self.inner.session.current_user_id() else {
            tracing::debug!(trigger, "no session, skipping scheduled sync");
            return;
        };
        for (collection, outcome) in self.sync_all(&user).await {
            if let Err(e) = outcome {
                tracing::warn!(%collection, trigger, error = %e, "scheduled sync failed");
            }
        }
    }

    fn schema(&self, collection: &str) -> Result<CollectionSchema> {
        self.inner.schemas.get(collection).cloned().ok_or_else(|| Error::UnknownCollection(collection.to_string()))
    }

    fn reconciler(&self, collection: &str, bootstrap: bool) -> Reconciler {
        let settings = &self.inner.settings;
        if bootstrap {
            Reconciler::new(Strategy::RemoteWins, RemoteOnlyPolicy::PullHydrate, Arc::clone(&self.inner.clock))
        } else {
            Reconciler::new(settings.strategy_for(collection), settings.remote_only, Arc::clone(&self.inner.clock))
        }
    }

    /// Claims `in_flight` for a run, or returns `None` if taken.
    fn try_begin<'a>(&'a self, collection: &'a str) -> Option<InFlightGuard<'a, R>> {
        self.claim(collection, Some(ConnectionStatus::Checking))
    }

    /// Claims `in_flight` for a single write or event, keeping the status.
    fn try_hold<'a>(&'a self, collection: &'a str) -> Option<InFlightGuard<'a, R>> {
        self.claim(collection, None)
    }

    fn claim<'a>(&'a self, collection: &'a str, status: Option<ConnectionStatus>) -> Option<InFlightGuard<'a, R>> {
        let claimed = self.update_state(collection, |state| {
            if state.in_flight {
                return false;
            }
            state.in_flight = true;
            if let Some(status) = status {
                state.connection_status = status;
            }
            true
        });
        claimed.then(|| InFlightGuard { orchestrator: self, collection })
    }

    /// Mutates one collection's state and broadcasts it if it changed.
    fn update_state<T>(&self, collection: &str, f: impl FnOnce(&mut SyncState) -> T) -> T {
        let status = self.inner.monitor.status();
        let (out, changed) = {
            let mut states = self.inner.states.lock().unwrap_or_else(|e| e.into_inner());
            let state = states.entry(collection.to_string()).or_insert_with(|| SyncState::new(status));
            let before = state.clone();
            let out = f(state);
            (out, (*state != before).then(|| state.clone()))
        };
        if let Some(state) = changed {
            // No receivers is fine.
            let _ = self.inner.events.send(SyncEvent { collection: collection.to_string(), state });
        }
        out
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
