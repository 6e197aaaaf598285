// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket realtime channel.
//!
//! Speaks the JSON protocol in [`tend_core::protocol`]: the client sends
//! `subscribe`/`unsubscribe`, the server pushes `change` messages tagged with
//! the subscription id. The connection is opened lazily by the first
//! subscription. A background reader task dispatches changes to the
//! registered callbacks.
//!
//! If the connection drops, subscriptions are not replayed; the orchestrator
//! keeps syncing through polling until the next session re-subscribes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tend_core::{ClientMessage, EventFilter, ServerMessage, SubscriptionId};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::realtime::{ChangeCallback, RealtimeChannel, RealtimeError, RealtimeFuture};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Callbacks = Arc<Mutex<HashMap<SubscriptionId, ChangeCallback>>>;

struct Connection {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
}

/// Realtime channel over a WebSocket.
pub struct WebSocketChannel {
    url: String,
    connection: tokio::sync::Mutex<Option<Connection>>,
    callbacks: Callbacks,
    next_id: AtomicU64,
}

impl WebSocketChannel {
    pub fn new(url: impl Into<String>) -> Self {
        WebSocketChannel {
            url: url.into(),
            connection: tokio::sync::Mutex::new(None),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        lock(&self.callbacks).len()
    }

    /// Sends `msg`, connecting first if needed.
    async fn send(&self, msg: ClientMessage) -> Result<(), RealtimeError> {
        let json = msg.to_json().map_err(|e| RealtimeError::Serialization(e.to_string()))?;
        let mut guard = self.connection.lock().await;

        if guard.as_ref().map_or(true, |c| c.reader.is_finished()) {
            let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
                .await
                .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
            let (sink, stream) = ws.split();
            let reader = tokio::spawn(read_loop(stream, Arc::clone(&self.callbacks)));
            tracing::debug!(url = %self.url, "realtime channel connected");
            *guard = Some(Connection { sink, reader });
        }

        let Some(conn) = guard.as_mut() else {
            return Err(RealtimeError::ConnectionClosed);
        };
        let sent = match conn.sink.send(Message::Text(json.into())).await {
            Ok(()) => conn.sink.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            if let Some(conn) = guard.take() {
                conn.reader.abort();
            }
            return Err(RealtimeError::SendFailed(e.to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(mut conn) = self.connection.lock().await.take() {
            let _ = conn.sink.close().await;
            conn.reader.abort();
            tracing::debug!(url = %self.url, "realtime channel disconnected");
        }
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.get_mut().take() {
            conn.reader.abort();
        }
    }
}

impl RealtimeChannel for WebSocketChannel {
    fn subscribe<'a>(
        &'a self,
        collection: &'a str,
        filter: EventFilter,
        callback: ChangeCallback,
    ) -> RealtimeFuture<'a, SubscriptionId> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            lock(&self.callbacks).insert(id, callback);
            if let Err(e) = self.send(ClientMessage::subscribe(id, collection, filter)).await {
                lock(&self.callbacks).remove(&id);
                return Err(e);
            }
            Ok(id)
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) -> RealtimeFuture<'_, ()> {
        Box::pin(async move {
            if lock(&self.callbacks).remove(&id).is_none() {
                return Ok(());
            }
            self.send(ClientMessage::unsubscribe(id)).await
        })
    }

    fn unsubscribe_all(&self) -> RealtimeFuture<'_, ()> {
        Box::pin(async move {
            let ids: Vec<SubscriptionId> = lock(&self.callbacks).drain().map(|(id, _)| id).collect();
            let connected = self.connection.lock().await.is_some();
            let mut result = Ok(());
            if connected {
                for id in ids {
                    if let Err(e) = self.send(ClientMessage::unsubscribe(id)).await {
                        result = Err(e);
                        break;
                    }
                }
            }
            self.disconnect().await;
            result
        })
    }
}

fn lock(callbacks: &Callbacks) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, ChangeCallback>> {
    callbacks.lock().unwrap_or_else(|e| e.into_inner())
}

async fn read_loop(mut stream: SplitStream<WsStream>, callbacks: Callbacks) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                Ok(msg) => dispatch(msg, &callbacks),
                Err(e) => tracing::warn!(error = %e, "ignoring malformed realtime message"),
            },
            Some(Ok(Message::Close(_))) | None => {
                tracing::info!("realtime channel closed by server");
                return;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "realtime channel failed");
                return;
            }
        }
    }
}

fn dispatch(msg: ServerMessage, callbacks: &Callbacks) {
    match msg {
        ServerMessage::Change { subscription, event } => {
            let callback = lock(callbacks).get(&subscription).cloned();
            match callback {
                Some(callback) => callback(event),
                None => tracing::debug!(subscription, "change for unknown subscription"),
            }
        }
        ServerMessage::Subscribed { subscription } => {
            tracing::debug!(subscription, "subscription confirmed");
        }
        ServerMessage::Error { subscription, message } => {
            tracing::warn!(?subscription, %message, "realtime server error");
        }
        ServerMessage::Pong { .. } => {}
    }
}

#[cfg(test)]
#[path = "websocket_tests.rs"]
mod tests;
