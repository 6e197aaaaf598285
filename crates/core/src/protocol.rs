// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime protocol messages for the change feed.
//!
//! The protocol is simple:
//! - Client subscribes to a collection with a filter, and may unsubscribe
//! - Server acknowledges subscriptions and pushes change events for them
//!
//! Change events carry the record in its wire form; the receiver maps it
//! through the collection schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Fields;
use crate::op::OpKind;

/// Identifier of one subscription on a realtime connection.
pub type SubscriptionId = u64;

/// Restricts which change events a subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Event kinds to deliver; empty means all kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<OpKind>,
    /// Only deliver records whose owner column equals this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerFilter>,
}

/// Equality filter on the owner column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerFilter {
    pub column: String,
    pub value: String,
}

impl EventFilter {
    /// Matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches events for records owned by `value`.
    pub fn owned_by(column: impl Into<String>, value: impl Into<String>) -> Self {
        EventFilter { kinds: Vec::new(), owner: Some(OwnerFilter { column: column.into(), value: value.into() }) }
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = OpKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Returns true if `event` passes this filter.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        match &self.owner {
            Some(owner) => event.record.get(&owner.column).and_then(Value::as_str) == Some(owner.value.as_str()),
            None => true,
        }
    }
}

/// A remote-side change to one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub kind: OpKind,
    /// The record after the change, in wire form.
    pub record: Fields,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving changes for a collection.
    Subscribe {
        /// Client-chosen id echoed on every matching change.
        subscription: SubscriptionId,
        collection: String,
        #[serde(default)]
        filter: EventFilter,
    },

    /// Stop receiving changes for a subscription.
    Unsubscribe { subscription: SubscriptionId },

    /// Ping message for keepalive.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges a Subscribe.
    Subscribed { subscription: SubscriptionId },

    /// A change matching a subscription.
    Change { subscription: SubscriptionId, event: ChangeEvent },

    /// Pong response to client Ping.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },

    /// Error message.
    Error {
        /// Subscription the error refers to, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription: Option<SubscriptionId>,
        /// Human-readable error description.
        message: String,
    },
}

impl ClientMessage {
    /// Creates a Subscribe message.
    pub fn subscribe(subscription: SubscriptionId, collection: impl Into<String>, filter: EventFilter) -> Self {
        ClientMessage::Subscribe { subscription, collection: collection.into(), filter }
    }

    /// Creates an Unsubscribe message.
    pub fn unsubscribe(subscription: SubscriptionId) -> Self {
        ClientMessage::Unsubscribe { subscription }
    }

    /// Creates a Ping message.
    pub fn ping(id: u64) -> Self {
        ClientMessage::Ping { id }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates a Change message.
    pub fn change(subscription: SubscriptionId, event: ChangeEvent) -> Self {
        ServerMessage::Change { subscription, event }
    }

    /// Creates an Error message.
    pub fn error(subscription: Option<SubscriptionId>, message: impl Into<String>) -> Self {
        ServerMessage::Error { subscription, message: message.into() }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
