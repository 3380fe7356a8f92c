// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! WebSocket frame types.
//!
//! Every frame is JSON `{event, data}`. Binary payloads (updates, state
//! vectors) travel as arrays of byte values.

use duet_core::{Cursor, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound frame envelope.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Outbound frame envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    pub event: &'static str,
    pub data: Value,
}

impl ServerFrame {
    pub fn new(event: &'static str, data: Value) -> Self {
        Self { event, data }
    }
}

/// Error codes carried by `crdt-error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrdtErrorCode {
    #[serde(rename = "SYNC_STEP1_ERROR")]
    SyncStep1,
    #[serde(rename = "SYNC_REQUEST_ERROR")]
    SyncRequest,
    #[serde(rename = "INVALID_UPDATE")]
    InvalidUpdate,
    #[serde(rename = "UPDATE_ERROR")]
    UpdateError,
    #[serde(rename = "CONFLICT_RESOLUTION_FAILED")]
    ConflictResolutionFailed,
    #[serde(rename = "CONFLICT_RESOLUTION_ERROR")]
    ConflictResolutionError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: RoomId,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoom {
    pub room_id: RoomId,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOnly {
    pub room_id: RoomId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStep1 {
    pub room_id: RoomId,
    #[serde(default)]
    pub state_vector: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdtUpdate {
    pub room_id: RoomId,
    pub update: Vec<u8>,
    #[serde(default)]
    pub origin: Option<String>,
}

/// Cursor as sent on the wire (1-based line, 0-based column).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCursor {
    pub line_number: u32,
    pub column: u32,
}

impl From<WireCursor> for Cursor {
    fn from(w: WireCursor) -> Self {
        Cursor { line: w.line_number, column: w.column }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    pub room_id: RoomId,
    pub cursor: WireCursor,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub room_id: RoomId,
    /// Opaque presence payload; `active` is the only field the server
    /// interprets.
    #[serde(default)]
    pub presence: Value,
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
