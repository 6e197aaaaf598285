// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity monitoring.
//!
//! The monitor answers one question: can the remote store be reached right
//! now? It polls an injected [`NetworkProbe`] on demand and on a timer, and
//! optionally listens to a platform presence signal. It only publishes a
//! status; it never starts a sync itself.
//!
//! A transport failure means offline. An application failure means the
//! remote answered, so the channel works and the status is online.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::store::StoreFuture;

/// Lightweight reachability check against the remote.
pub trait NetworkProbe: Send + Sync {
    /// Performs a no-op round trip.
    fn probe(&self) -> StoreFuture<'_, ()>;
}

impl<P: NetworkProbe + ?Sized> NetworkProbe for Arc<P> {
    fn probe(&self) -> StoreFuture<'_, ()> {
        (**self).probe()
    }
}

/// Connection status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Online,
    Offline,
    Checking,
    Syncing,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Online => "online",
            ConnectionStatus::Offline => "offline",
            ConnectionStatus::Checking => "checking",
            ConnectionStatus::Syncing => "syncing",
        }
    }

    /// Returns true for the statuses that imply the remote is reachable.
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionStatus::Online | ConnectionStatus::Syncing)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Publishes the reachability of the remote store.
///
/// Starts offline until the first successful check.
pub struct ConnectivityMonitor {
    probe: Arc<dyn NetworkProbe>,
    status: watch::Sender<ConnectionStatus>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn NetworkProbe>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Offline);
        ConnectivityMonitor { probe, status }
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status() == ConnectionStatus::Online
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Probes the remote now and publishes the result.
    pub async fn check_now(&self) -> ConnectionStatus {
        let before = self.publish(ConnectionStatus::Checking);

        let status = match self.probe.probe().await {
            Ok(()) => ConnectionStatus::Online,
            Err(e) if e.is_transport() => {
                tracing::debug!(error = %e, "connectivity probe failed");
                ConnectionStatus::Offline
            }
            Err(e) => {
                tracing::debug!(error = %e, "remote reachable but returned an error");
                ConnectionStatus::Online
            }
        };

        self.publish(status);
        if before != status && before != ConnectionStatus::Checking {
            tracing::info!(from = %before, to = %status, "connectivity changed");
        }
        status
    }

    /// Marks the remote unreachable without probing.
    ///
    /// Used when a platform signal or a failed request already told us.
    pub fn mark_offline(&self) {
        if self.publish(ConnectionStatus::Offline) == ConnectionStatus::Online {
            tracing::info!(from = "online", to = "offline", "connectivity changed");
        }
    }

    /// Runs periodic checks until `cancel` fires.
    ///
    /// The first check runs immediately. When a presence receiver is given,
    /// `false` marks offline at once and `true` triggers a check.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        presence: Option<mpsc::Receiver<bool>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut presence = presence;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        self.check_now().await;
                    }
                    signal = next_presence(&mut presence) => match signal {
                        Some(true) => {
                            self.check_now().await;
                        }
                        Some(false) => self.mark_offline(),
                        None => presence = None,
                    },
                }
            }
        })
    }

    /// Stores `status`, notifying subscribers only on change. Returns the
    /// previous status.
    fn publish(&self, status: ConnectionStatus) -> ConnectionStatus {
        let mut previous = status;
        self.status.send_if_modified(|current| {
            previous = *current;
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        previous
    }
}

async fn next_presence(rx: &mut Option<mpsc::Receiver<bool>>) -> Option<bool> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
