// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime change feed.
//!
//! A [`RealtimeChannel`] pushes remote-side change events for the
//! collections it is subscribed to. The feed is a latency optimization:
//! when the channel is unavailable the orchestrator keeps converging through
//! its polling path.
//!
//! [`RealtimeFeed`] owns the subscriptions of one session and forwards every
//! event into a single queue that the orchestrator ingests from.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tend_core::{ChangeEvent, EventFilter, SubscriptionId};
use tokio::sync::mpsc;

/// Error type for realtime channel operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Boxed future returned by channel methods.
pub type RealtimeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RealtimeError>> + Send + 'a>>;

/// Invoked for every event delivered to a subscription.
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Push channel of remote change events.
pub trait RealtimeChannel: Send + Sync {
    /// Subscribe to changes in `collection` that pass `filter`.
    fn subscribe<'a>(
        &'a self,
        collection: &'a str,
        filter: EventFilter,
        callback: ChangeCallback,
    ) -> RealtimeFuture<'a, SubscriptionId>;

    /// Revoke one subscription.
    fn unsubscribe(&self, id: SubscriptionId) -> RealtimeFuture<'_, ()>;

    /// Revoke every subscription on this channel.
    fn unsubscribe_all(&self) -> RealtimeFuture<'_, ()>;
}

/// The subscriptions held for one session.
pub struct RealtimeFeed {
    channel: Arc<dyn RealtimeChannel>,
    subscriptions: Mutex<Vec<(String, SubscriptionId)>>,
}

impl RealtimeFeed {
    pub fn new(channel: Arc<dyn RealtimeChannel>) -> Self {
        RealtimeFeed { channel, subscriptions: Mutex::new(Vec::new()) }
    }

    /// Subscribes each collection, forwarding its events to `sink`.
    ///
    /// A collection that fails to subscribe is logged and left to polling.
    /// Returns the number of live subscriptions.
    pub async fn subscribe_all(
        &self,
        targets: Vec<(String, EventFilter)>,
        sink: mpsc::UnboundedSender<ChangeEvent>,
    ) -> usize {
        for (collection, filter) in targets {
            let tx = sink.clone();
            let callback: ChangeCallback = Arc::new(move |event: ChangeEvent| {
                let _ = tx.send(event);
            });
            match self.channel.subscribe(&collection, filter, callback).await {
                Ok(id) => {
                    tracing::debug!(%collection, subscription = id, "subscribed to realtime changes");
                    self.lock().push((collection, id));
                }
                Err(e) => {
                    tracing::warn!(%collection, error = %e, "realtime unavailable, relying on polling");
                }
            }
        }
        self.lock().len()
    }

    /// Collections with a live subscription.
    pub fn subscribed(&self) -> Vec<String> {
        self.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    /// Revokes every subscription.
    pub async fn close(&self) {
        let count = std::mem::take(&mut *self.lock()).len();
        if let Err(e) = self.channel.unsubscribe_all().await {
            tracing::warn!(error = %e, "failed to revoke realtime subscriptions");
        } else if count > 0 {
            tracing::debug!(count, "revoked realtime subscriptions");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, SubscriptionId)>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "realtime_tests.rs"]
mod tests;
