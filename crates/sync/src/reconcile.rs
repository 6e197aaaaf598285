// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation of a local collection with its remote copy.
//!
//! A run has two phases:
//!
//! 1. [`Reconciler::plan`] is pure: it indexes both snapshots by id and
//!    classifies every id as insert-remote, unchanged, conflict (resolved
//!    with the configured [`Strategy`]) or remote-only (handled by the
//!    [`RemoteOnlyPolicy`]).
//! 2. [`Reconciler::execute`] performs the remote writes the plan needs.
//!    Each write is independent; a failure is recorded in the report and
//!    never aborts the batch.
//!
//! The outcome carries the converged snapshot for the local store. If the
//! remote becomes unreachable mid-run, the local snapshot is returned
//! unchanged instead.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tend_core::{Clock, CollectionSchema, ConflictRecord, Entity, Fields, Resolution, Strategy};

use crate::store::{Filter, RemoteError, RemoteStore};

/// What to do with records that exist remotely but not locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteOnlyPolicy {
    /// Hydrate local state from the remote record.
    #[default]
    PullHydrate,
    /// Treat the local absence as a deletion and tombstone the remote record.
    PropagateDelete,
}

impl RemoteOnlyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOnlyPolicy::PullHydrate => "pull-hydrate",
            RemoteOnlyPolicy::PropagateDelete => "propagate-delete",
        }
    }
}

impl fmt::Display for RemoteOnlyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RemoteOnlyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull-hydrate" => Ok(RemoteOnlyPolicy::PullHydrate),
            "propagate-delete" => Ok(RemoteOnlyPolicy::PropagateDelete),
            _ => Err(format!("unknown remote-only policy '{s}' (expected pull-hydrate or propagate-delete)")),
        }
    }
}

/// One classified id.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Present locally only; write it to the remote.
    InsertRemote(Entity),
    /// Same payload on both sides; no write. Holds the newer metadata.
    Unchanged(Entity),
    /// Conflict resolved in favor of a local or merged entity; write it.
    UpdateRemote { entity: Entity, conflict: ConflictRecord },
    /// Conflict resolved in favor of the remote copy; adopt it locally.
    AdoptRemote { entity: Entity, conflict: ConflictRecord },
    /// Present remotely only; hydrate local state.
    PullRemote(Entity),
    /// Present remotely only; tombstone the remote copy.
    DeleteRemote(Entity),
}

impl Action {
    pub fn entity(&self) -> &Entity {
        match self {
            Action::InsertRemote(e)
            | Action::Unchanged(e)
            | Action::PullRemote(e)
            | Action::DeleteRemote(e)
            | Action::UpdateRemote { entity: e, .. }
            | Action::AdoptRemote { entity: e, .. } => e,
        }
    }
}

/// The classified actions of one run.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub collection: String,
    pub strategy: Strategy,
    /// Actions in id order.
    pub actions: Vec<Action>,
    /// Number of ids whose payloads differed.
    pub conflicts: usize,
    local: Vec<Entity>,
}

/// A per-entity failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFailure {
    pub entity_id: String,
    pub message: String,
    /// The remote could not be reached.
    pub transport: bool,
}

impl EntityFailure {
    fn remote(entity_id: &str, error: &RemoteError) -> Self {
        EntityFailure { entity_id: entity_id.to_string(), message: error.to_string(), transport: error.is_transport() }
    }
}

/// Structured result of a reconciliation run.
///
/// Callers inspect the counts and `errors` to detect partial failure.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub pulled: usize,
    pub conflicts: usize,
    pub conflicts_resolved: usize,
    pub errors: Vec<EntityFailure>,
    pub resolutions: Vec<ConflictRecord>,
    /// Set when the remote snapshot could not be fetched.
    pub select_error: Option<RemoteError>,
    /// False when any remote call failed for transport reasons.
    pub remote_reachable: bool,
}

impl ReconcileReport {
    /// Returns true if the run completed without any failure.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.select_error.is_none()
    }
}

/// Report plus the snapshot the local store should converge on.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub report: ReconcileReport,
    pub snapshot: Vec<Entity>,
}

/// Diffs and converges one collection.
#[derive(Clone)]
pub struct Reconciler {
    strategy: Strategy,
    remote_only: RemoteOnlyPolicy,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(strategy: Strategy, remote_only: RemoteOnlyPolicy, clock: Arc<dyn Clock>) -> Self {
        Reconciler { strategy, remote_only, clock }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn remote_only(&self) -> RemoteOnlyPolicy {
        self.remote_only
    }

    /// Resolves one pair of copies of the same entity.
    ///
    /// Returns `None` when the payloads are the same.
    pub fn resolve_pair(&self, collection: &str, local: &Entity, remote: &Entity) -> Option<(Resolution, ConflictRecord)> {
        if local.same_payload(remote) {
            return None;
        }
        let now = self.clock.now();
        let resolution = self.strategy.resolve(local, remote, now);
        let record = ConflictRecord::new(collection, local, remote, self.strategy, &resolution, now);
        Some((resolution, record))
    }

    /// Classifies every id of the two snapshots.
    pub fn plan(&self, collection: &str, local: &[Entity], remote: &[Entity]) -> ReconcilePlan {
        let local_by_id: BTreeMap<&str, &Entity> = local.iter().map(|e| (e.id.as_str(), e)).collect();
        let remote_by_id: BTreeMap<&str, &Entity> = remote.iter().map(|e| (e.id.as_str(), e)).collect();

        let mut ids: Vec<&str> = local_by_id.keys().chain(remote_by_id.keys()).copied().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut actions = Vec::with_capacity(ids.len());
        let mut conflicts = 0;
        for id in ids {
            let action = match (local_by_id.get(id), remote_by_id.get(id)) {
                (Some(l), None) => Action::InsertRemote((*l).clone()),
                (Some(l), Some(r)) => match self.resolve_pair(collection, l, r) {
                    None => Action::Unchanged((*l).clone().raised_to(r.version, r.updated_at)),
                    Some((resolution, conflict)) => {
                        conflicts += 1;
                        if resolution.needs_remote_write() {
                            Action::UpdateRemote { entity: resolution.entity, conflict }
                        } else {
                            Action::AdoptRemote { entity: resolution.entity, conflict }
                        }
                    }
                },
                (None, Some(r)) => match self.remote_only {
                    RemoteOnlyPolicy::PullHydrate => Action::PullRemote((*r).clone()),
                    RemoteOnlyPolicy::PropagateDelete if r.deleted => Action::PullRemote((*r).clone()),
                    RemoteOnlyPolicy::PropagateDelete => Action::DeleteRemote(r.tombstone(self.clock.now())),
                },
                (None, None) => continue,
            };
            actions.push(action);
        }

        ReconcilePlan { collection: collection.to_string(), strategy: self.strategy, actions, conflicts, local: local.to_vec() }
    }

    /// Performs the remote writes of a plan.
    pub async fn execute<R: RemoteStore + ?Sized>(
        &self,
        plan: ReconcilePlan,
        remote: &R,
        schema: &CollectionSchema,
    ) -> ReconcileOutcome {
        let collection = plan.collection.as_str();
        let mut report = ReconcileReport { conflicts: plan.conflicts, remote_reachable: true, ..Default::default() };
        let mut snapshot = Vec::with_capacity(plan.actions.len());

        for action in plan.actions.iter() {
            match action {
                Action::InsertRemote(entity) => {
                    match remote.insert(collection, schema.to_wire(entity)).await {
                        Ok(()) => report.inserted += 1,
                        Err(e) => fail(&mut report, &entity.id, &e),
                    }
                    snapshot.push(entity.clone());
                }
                Action::Unchanged(entity) | Action::PullRemote(entity) => {
                    if matches!(action, Action::PullRemote(_)) {
                        report.pulled += 1;
                    }
                    snapshot.push(entity.clone());
                }
                Action::AdoptRemote { entity, conflict } => {
                    report.conflicts_resolved += 1;
                    report.resolutions.push(conflict.clone());
                    snapshot.push(entity.clone());
                }
                Action::UpdateRemote { entity, conflict } => {
                    match remote.update(collection, &entity.id, schema.to_wire(entity)).await {
                        Ok(()) => {
                            report.updated += 1;
                            report.conflicts_resolved += 1;
                            report.resolutions.push(conflict.clone());
                        }
                        Err(e) => fail(&mut report, &entity.id, &e),
                    }
                    snapshot.push(entity.clone());
                }
                Action::DeleteRemote(tombstone) => match remote.update(collection, &tombstone.id, schema.to_wire(tombstone)).await {
                    Ok(()) => {
                        report.deleted += 1;
                        snapshot.push(tombstone.clone());
                    }
                    Err(e) => fail(&mut report, &tombstone.id, &e),
                },
            }
        }

        if !report.remote_reachable {
            tracing::warn!(%collection, errors = report.errors.len(), "remote unreachable mid-run, keeping local snapshot");
            return ReconcileOutcome { report, snapshot: plan.local };
        }

        tracing::info!(
            %collection,
            strategy = %plan.strategy,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            pulled = report.pulled,
            conflicts = report.conflicts,
            resolved = report.conflicts_resolved,
            errors = report.errors.len(),
            "reconciled collection"
        );
        ReconcileOutcome { report, snapshot }
    }

    /// Fetches the remote snapshot, then plans and executes a run.
    pub async fn reconcile<R: RemoteStore + ?Sized>(
        &self,
        local: Vec<Entity>,
        remote: &R,
        schema: &CollectionSchema,
        filter: &Filter,
    ) -> ReconcileOutcome {
        let records = match remote.select(&schema.name, filter).await {
            Ok(records) => records,
            Err(e) => return unreachable(&schema.name, local, e),
        };
        let (entities, rejected) = decode(schema, records);
        let plan = self.plan(&schema.name, &local, &entities);
        let mut outcome = self.execute(plan, remote, schema).await;
        outcome.report.errors.extend(rejected);
        outcome
    }
}

fn fail(report: &mut ReconcileReport, entity_id: &str, error: &RemoteError) {
    tracing::warn!(entity = entity_id, %error, "remote write failed during reconciliation");
    if error.is_transport() {
        report.remote_reachable = false;
    }
    report.errors.push(EntityFailure::remote(entity_id, error));
}

/// Outcome of a run whose remote snapshot could not be fetched.
pub(crate) fn unreachable(collection: &str, local: Vec<Entity>, error: RemoteError) -> ReconcileOutcome {
    tracing::warn!(%collection, %error, "could not fetch remote snapshot, keeping local snapshot");
    let report = ReconcileReport { remote_reachable: !error.is_transport(), select_error: Some(error), ..Default::default() };
    ReconcileOutcome { report, snapshot: local }
}

/// Parses wire records, setting aside the malformed ones.
pub fn decode(schema: &CollectionSchema, records: Vec<Fields>) -> (Vec<Entity>, Vec<EntityFailure>) {
    let mut entities = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for record in records {
        match schema.from_wire(&record) {
            Ok(entity) => entities.push(entity),
            Err(e) => {
                let entity_id = match record.get("id") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => "<missing>".to_string(),
                };
                tracing::warn!(collection = %schema.name, entity = %entity_id, error = %e, "skipping malformed remote record");
                rejected.push(EntityFailure { entity_id, message: e.to_string(), transport: false });
            }
        }
    }
    (entities, rejected)
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
