// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Room event handlers.

use super::MaterializedState;
use duet_core::{Event, JoinKey, Room};

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::RoomCreated { id, join_key, created_at_ms } => {
            // Idempotency: skip if room already exists
            if !state.rooms.contains_key(id) {
                // The key was validated at generation; an unparseable key in
                // the journal is replaced rather than crashing recovery.
                let key = JoinKey::parse(join_key).unwrap_or_else(JoinKey::generate);
                state.rooms.insert(*id, Room::new(*id, key, *created_at_ms));
            }
        }

        Event::RoomActivity { id, at_ms } => {
            if let Some(room) = state.rooms.get_mut(id) {
                room.last_activity_ms = *at_ms;
            }
        }

        Event::RoomSnapshotUpdated { id, content, crdt_state, at_ms } => {
            if let Some(room) = state.rooms.get_mut(id) {
                room.code_snapshot = content.clone();
                if let Some(bytes) = crdt_state {
                    room.crdt_state = bytes.clone();
                }
                room.last_activity_ms = *at_ms;
            }
        }

        Event::RoomArchived { id, at_ms } => {
            if let Some(room) = state.rooms.get_mut(id) {
                room.is_archived = true;
                room.last_activity_ms = *at_ms;
            }
        }

        Event::RoomDeleted { id } => {
            state.rooms.remove(id);
            // Cascade: participants, snapshots, jobs, and queue entries
            // referencing the room's jobs all go with it.
            state.participants.retain(|_, p| p.room_id != *id);
            state.snapshots.remove(id);
            let dead_jobs: Vec<_> = state
                .jobs
                .values()
                .filter(|j| j.room_id == *id)
                .map(|j| j.id)
                .collect();
            state.jobs.retain(|_, j| j.room_id != *id);
            state.queue_items.retain(|i| !dead_jobs.contains(&i.job_id));
        }

        _ => {}
    }
}
