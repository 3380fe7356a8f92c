// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Event vocabulary for the journal.
//!
//! Every durable state mutation is one of these events, appended to the
//! journal and applied to the materialized state. Serializes with
//! `{"type": "domain:action", ...fields}` format. Unknown type tags
//! deserialize to `Custom` so older journals stay readable.

use crate::exec::ExecOptions;
use crate::job::JobId;
use crate::participant::Cursor;
use crate::room::RoomId;
use crate::snapshot::{SnapshotId, SnapshotKind};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a durable queue item.
    pub struct QueueItemId("qi-");
}

/// Events that drive all durable state transitions.
///
/// # Idempotency Requirement
///
/// **All event handlers MUST be idempotent.** Applying the same event
/// twice must produce the same state as applying it once; checkpoint
/// recovery replays the journal tail over state that may already
/// include some of it. Handlers use assignment instead of bare
/// increments, guard inserts with existence checks, and gate terminal
/// job writes on the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- room --
    #[serde(rename = "room:created")]
    RoomCreated {
        id: RoomId,
        join_key: String,
        created_at_ms: u64,
    },

    #[serde(rename = "room:activity")]
    RoomActivity { id: RoomId, at_ms: u64 },

    /// Latest document rendering persisted onto the room row.
    #[serde(rename = "room:snapshot_updated")]
    RoomSnapshotUpdated {
        id: RoomId,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crdt_state: Option<Vec<u8>>,
        at_ms: u64,
    },

    #[serde(rename = "room:archived")]
    RoomArchived { id: RoomId, at_ms: u64 },

    /// Cascade-deletes the room's participants, snapshots, and jobs.
    #[serde(rename = "room:deleted")]
    RoomDeleted { id: RoomId },

    // -- participant --
    /// Upsert: reactivates the existing (room, user) row if present.
    #[serde(rename = "participant:joined")]
    ParticipantJoined {
        room_id: RoomId,
        user_id: String,
        color: String,
        at_ms: u64,
    },

    #[serde(rename = "participant:left")]
    ParticipantLeft {
        room_id: RoomId,
        user_id: String,
        at_ms: u64,
    },

    #[serde(rename = "participant:cursor")]
    ParticipantCursor {
        room_id: RoomId,
        user_id: String,
        cursor: Cursor,
        at_ms: u64,
    },

    #[serde(rename = "participant:presence")]
    ParticipantPresence {
        room_id: RoomId,
        user_id: String,
        active: bool,
        at_ms: u64,
    },

    // -- job --
    #[serde(rename = "job:created")]
    JobCreated {
        id: JobId,
        room_id: RoomId,
        user_id: String,
        code: String,
        options: ExecOptions,
        created_at_ms: u64,
    },

    #[serde(rename = "job:started")]
    JobStarted { id: JobId, at_ms: u64 },

    #[serde(rename = "job:completed")]
    JobCompleted {
        id: JobId,
        stdout: String,
        stderr: String,
        exit_code: i32,
        execution_time_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memory_bytes: Option<u64>,
        at_ms: u64,
    },

    #[serde(rename = "job:failed")]
    JobFailed {
        id: JobId,
        stderr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        at_ms: u64,
    },

    #[serde(rename = "job:timeout")]
    JobTimedOut {
        id: JobId,
        execution_time_ms: u64,
        /// Output captured before the watchdog fired, possibly partial.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stdout: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
        at_ms: u64,
    },

    #[serde(rename = "job:cancelled")]
    JobCancelled { id: JobId, at_ms: u64 },

    #[serde(rename = "job:deleted")]
    JobDeleted { id: JobId },

    // -- snapshot --
    #[serde(rename = "snapshot:created")]
    SnapshotCreated {
        id: SnapshotId,
        room_id: RoomId,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crdt_state: Option<Vec<u8>>,
        kind: SnapshotKind,
        at_ms: u64,
    },

    /// Retain only the `keep` newest snapshots for the room.
    #[serde(rename = "snapshot:pruned")]
    SnapshotPruned { room_id: RoomId, keep: u32 },

    // -- queue --
    #[serde(rename = "queue:pushed")]
    QueuePushed {
        item_id: QueueItemId,
        job_id: JobId,
        priority: u8,
        pushed_at_ms: u64,
    },

    #[serde(rename = "queue:taken")]
    QueueTaken {
        item_id: QueueItemId,
        worker: String,
        at_ms: u64,
    },

    #[serde(rename = "queue:completed")]
    QueueCompleted { item_id: QueueItemId, at_ms: u64 },

    /// Infrastructure failure: schedule a retry after backoff.
    #[serde(rename = "queue:retried")]
    QueueRetried {
        item_id: QueueItemId,
        error: String,
        not_before_ms: u64,
        at_ms: u64,
    },

    /// Attempts exhausted; the item lands in the failed bucket.
    #[serde(rename = "queue:failed")]
    QueueFailed {
        item_id: QueueItemId,
        error: String,
        at_ms: u64,
    },

    #[serde(rename = "queue:dropped")]
    QueueDropped { item_id: QueueItemId },

    // -- system --
    #[serde(rename = "system:shutdown")]
    Shutdown,

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    /// Short tag for logging, matching the serialized `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::RoomCreated { .. } => "room:created",
            Event::RoomActivity { .. } => "room:activity",
            Event::RoomSnapshotUpdated { .. } => "room:snapshot_updated",
            Event::RoomArchived { .. } => "room:archived",
            Event::RoomDeleted { .. } => "room:deleted",
            Event::ParticipantJoined { .. } => "participant:joined",
            Event::ParticipantLeft { .. } => "participant:left",
            Event::ParticipantCursor { .. } => "participant:cursor",
            Event::ParticipantPresence { .. } => "participant:presence",
            Event::JobCreated { .. } => "job:created",
            Event::JobStarted { .. } => "job:started",
            Event::JobCompleted { .. } => "job:completed",
            Event::JobFailed { .. } => "job:failed",
            Event::JobTimedOut { .. } => "job:timeout",
            Event::JobCancelled { .. } => "job:cancelled",
            Event::JobDeleted { .. } => "job:deleted",
            Event::SnapshotCreated { .. } => "snapshot:created",
            Event::SnapshotPruned { .. } => "snapshot:pruned",
            Event::QueuePushed { .. } => "queue:pushed",
            Event::QueueTaken { .. } => "queue:taken",
            Event::QueueCompleted { .. } => "queue:completed",
            Event::QueueRetried { .. } => "queue:retried",
            Event::QueueFailed { .. } => "queue:failed",
            Event::QueueDropped { .. } => "queue:dropped",
            Event::Shutdown => "system:shutdown",
            Event::Custom => "custom",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
