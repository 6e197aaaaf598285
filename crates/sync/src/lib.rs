// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tend-sync: Offline-first sync engine
//!
//! Keeps a local SQLite cache of per-user collections in step with a remote
//! REST backend. Writes go straight to the remote when it is reachable and
//! land in a durable JSONL queue when it is not.
//!
//! ```text
//!   app writes ──► SyncOrchestrator ──► RemoteStore (HTTP)
//!                    │    │    ▲
//!          offline   │    │    └── ConnectivityMonitor (probe, presence)
//!                    ▼    ▼
//!           OfflineQueue  LocalStore ◄── Reconciler ◄── select
//!                               ▲
//!                               └── RealtimeChannel (WebSocket) change events
//! ```
//!
//! A sync run drains the queue, reconciles local and remote state under the
//! collection's [`Strategy`](tend_core::Strategy) and records the time of the
//! last successful run. At most one run is in flight per collection.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod http;
pub mod local;
pub mod orchestrator;
pub mod queue;
pub mod realtime;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod websocket;

#[cfg(test)]
mod test_helpers;

pub use config::Config;
pub use connectivity::{ConnectionStatus, ConnectivityMonitor, NetworkProbe};
pub use error::{Error, Result};
pub use http::HttpRemoteStore;
pub use local::LocalStore;
pub use orchestrator::{
    IngestOutcome, SkipReason, SyncEvent, SyncOrchestrator, SyncOutcome, SyncParts, SyncReport, SyncSettings,
    SyncState, WriteOutcome,
};
pub use queue::{DrainReport, OfflineQueue, QueueError};
pub use realtime::{RealtimeChannel, RealtimeError, RealtimeFeed};
pub use reconcile::{ReconcileOutcome, ReconcileReport, Reconciler, RemoteOnlyPolicy};
pub use session::{SessionProvider, StaticSession};
pub use store::{Filter, RemoteError, RemoteResult, RemoteStore, StoreFuture};
pub use websocket::WebSocketChannel;
