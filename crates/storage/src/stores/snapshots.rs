// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Snapshot Store: per-room document snapshots with bounded retention.

use crate::journal::Journal;
use crate::stores::StoreError;
use duet_core::{Clock, Event, RoomId, RoomSnapshot, SnapshotId, SnapshotKind};

/// Per-room retention cap; pruning keeps the newest.
pub const MAX_SNAPSHOTS_PER_ROOM: u32 = 20;

#[derive(Clone)]
pub struct SnapshotStore<C: Clock> {
    journal: Journal,
    clock: C,
}

impl<C: Clock> SnapshotStore<C> {
    pub fn new(journal: Journal, clock: C) -> Self {
        Self { journal, clock }
    }

    /// Write a snapshot and prune the room's history beyond the cap.
    pub fn create(
        &self,
        room_id: &RoomId,
        content: &str,
        crdt_state: Option<Vec<u8>>,
        kind: SnapshotKind,
    ) -> Result<SnapshotId, StoreError> {
        let id = SnapshotId::new();
        let now = self.clock.epoch_ms();
        self.journal.append(&[
            Event::SnapshotCreated {
                id,
                room_id: *room_id,
                content: content.to_string(),
                crdt_state,
                kind,
                at_ms: now,
            },
            Event::SnapshotPruned { room_id: *room_id, keep: MAX_SNAPSHOTS_PER_ROOM },
        ])?;
        Ok(id)
    }

    /// Latest snapshot of a room, if any.
    pub fn latest(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        self.journal.read(|s| s.latest_snapshot(room_id).cloned())
    }

    pub fn list(&self, room_id: &RoomId) -> Vec<RoomSnapshot> {
        self.journal.read(|s| s.snapshots.get(room_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "snapshots_tests.rs"]
mod tests;
