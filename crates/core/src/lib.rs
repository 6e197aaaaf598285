// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tend-core: Shared library for the tend sync engine
//!
//! This crate provides the data structures and pure rules used by the sync
//! engine and the tendd daemon: entities and their versioning, the wire
//! mapping, queued operations, conflict resolution and the realtime protocol.

pub mod clock;
pub mod entity;
pub mod error;
pub mod jsonl;
pub mod merge;
pub mod op;
pub mod protocol;
pub mod schema;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{Entity, Fields};
pub use error::{Error, Result};
pub use merge::{ConflictRecord, Resolution, Strategy, Winner};
pub use op::{OpId, OpKind, OpPayload, QueuedOperation};
pub use protocol::{ChangeEvent, ClientMessage, EventFilter, ServerMessage, SubscriptionId};
pub use schema::{CollectionSchema, FieldMap, SchemaRegistry};
